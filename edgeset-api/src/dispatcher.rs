//! Request dispatcher: runs one parsed [`Command`] against the node and streams
//! the body of the response. Framing lines (`ack_begin`, `ack_end`) belong to
//! the session.

use tracing::{debug, info};

use edgeset_core::error::Result;
use edgeset_storage::PersistentDevice;

use crate::command::Command;
use crate::node::EdgeNode;
use crate::protocol::{recv_chunked, send_chunked, LineChannel};

/// Status line after a distance recompute
pub const COMPUTE_DONE: &str = "done";
/// Status line after the subset indices of a selection
pub const SUBSET_DONE: &str = "subset_idxs_read_done";
/// Status line after the predicted labels of a selection
pub const PREDICTIONS_DONE: &str = "predicted_labels_read_done";

pub struct Dispatcher<D: PersistentDevice> {
    node: EdgeNode<D>,
    echo_input: bool,
}

impl<D: PersistentDevice> Dispatcher<D> {
    pub fn new(node: EdgeNode<D>) -> Self {
        let echo_input = node.config().protocol.echo_input;
        Self { node, echo_input }
    }

    pub fn node(&self) -> &EdgeNode<D> {
        &self.node
    }

    pub fn node_mut(&mut self) -> &mut EdgeNode<D> {
        &mut self.node
    }

    pub fn into_node(self) -> EdgeNode<D> {
        self.node
    }

    pub fn execute<C: LineChannel + ?Sized>(&mut self, command: &Command, channel: &mut C) -> Result<()> {
        debug!("Executing {:?}", command);
        let record_size = self.node.config().geometry.record_size();

        match *command {
            Command::WriteVolatile { index, chunk_size } => {
                let idx = self.node.volatile_index(index)?;
                let record = recv_chunked(channel, record_size, chunk_size, self.echo_input)?;
                self.node.write_record(idx, &record)
            }
            Command::ReadVolatile { index, chunk_size } => {
                let idx = self.node.volatile_index(index)?;
                let record = self.node.read_record(idx)?;
                send_chunked(channel, &record, chunk_size)
            }
            Command::WritePersistent { target, chunk_size } => {
                let idx = self.node.resolve_persistent(target)?;
                let record = recv_chunked(channel, record_size, chunk_size, self.echo_input)?;
                self.node.write_record(idx, &record)
            }
            Command::ReadPersistent { target, chunk_size } => {
                let idx = self.node.resolve_persistent(target)?;
                let record = self.node.read_record(idx)?;
                send_chunked(channel, &record, chunk_size)
            }
            Command::ReadLabels { chunk_size } => {
                let labels = self.node.labels()?;
                send_chunked(channel, labels.as_slice(), chunk_size)
            }
            Command::ComputeDistances => {
                self.node.compute_distances()?;
                channel.write_line(COMPUTE_DONE)
            }
            Command::ReadDistances { chunk_size } => {
                let matrix = self.node.ensure_distances()?;
                send_chunked(channel, matrix.as_slice(), chunk_size)
            }
            Command::SelectSubset { mode, chunk_size } => {
                let selection = self.node.select_subset(mode)?;

                send_chunked(channel, &selection.subset, chunk_size)?;
                channel.write_line(SUBSET_DONE)?;
                send_chunked(channel, &selection.predicted, chunk_size)?;
                channel.write_line(PREDICTIONS_DONE)?;

                let report = self.node.migrate(&selection.subset)?;
                info!(
                    "{} subset persisted: {} moved, {} sectors rewritten",
                    mode,
                    report.moves.len(),
                    report.sectors_rewritten
                );
                Ok(())
            }
            Command::Reseed { seed } => {
                self.node.reseed(seed);
                channel.write_line(&format!("random seed set to: {}", seed))
            }
        }
    }
}
