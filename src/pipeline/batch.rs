use tracing::{debug, warn};

use super::command::PipelineCommand;
use super::PipelineOptions;
use crate::cluster::commands::asking;
use crate::cluster::pool::{BoxConnection, ConnectionProvider, NodeConnection};
use crate::cluster::redirect::RedirectKind;
use crate::Error;

/// Commands bound for one node during one pass.
pub(crate) struct Batch<'a> {
    address: String,
    connection: Option<BoxConnection>,
    members: Vec<&'a mut PipelineCommand>,
}

impl<'a> Batch<'a> {
    /// Creates a batch, optionally reusing a connection the session already
    /// holds for `address`.
    pub(crate) fn new(address: String, connection: Option<BoxConnection>) -> Self {
        Self {
            address,
            connection,
            members: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, member: &'a mut PipelineCommand) {
        self.members.push(member);
    }

    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }

    /// Writes every member, flushes once, then reads one reply per member.
    ///
    /// Returns the address and the connection if it can be used again. A
    /// failure at any step records a connection error on every member that
    /// has no reply yet; other batches are unaffected.
    pub(crate) async fn run(
        mut self,
        provider: &dyn ConnectionProvider,
        options: &PipelineOptions,
    ) -> (String, Option<BoxConnection>) {
        let mut conn = match self.connection.take() {
            Some(conn) => conn,
            None => match provider
                .connection_for(&self.address, options.force_dial, options.read_only)
                .await
            {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(address = %self.address, error = %e, "failed to acquire connection");
                    self.fail_from(0, &e);
                    return (self.address, None);
                }
            },
        };

        match self.exchange(conn.as_mut()).await {
            Ok(()) => {
                debug!(address = %self.address, commands = self.members.len(), "batch complete");
                (self.address, Some(conn))
            }
            Err((first_unanswered, e)) => {
                warn!(address = %self.address, error = %e, "batch failed");
                self.fail_from(first_unanswered, &e);
                if let Err(e) = conn.close().await {
                    debug!(address = %self.address, error = %e, "close after failure");
                }
                (self.address, None)
            }
        }
    }

    /// On failure, returns the index of the first member without a reply.
    async fn exchange(&mut self, conn: &mut dyn NodeConnection) -> Result<(), (usize, Error)> {
        // decided before any reply overwrites the previous redirect
        let asking_first: Vec<bool> = self
            .members
            .iter()
            .map(|m| m.redirect().is_some_and(|r| r.kind == RedirectKind::Ask))
            .collect();

        for (member, &ask) in self.members.iter().zip(&asking_first) {
            if ask {
                conn.send(&asking()).await.map_err(|e| (0, e))?;
            }
            conn.send(member.cmd()).await.map_err(|e| (0, e))?;
        }
        conn.flush().await.map_err(|e| (0, e))?;

        for (index, &ask) in asking_first.iter().enumerate() {
            if ask {
                // the ASKING acknowledgement carries nothing for the caller
                conn.receive().await.map_err(|e| (index, e))?;
            }
            let reply = conn.receive().await.map_err(|e| (index, e))?;
            self.members[index].record(Ok(reply));
        }
        Ok(())
    }

    fn fail_from(&mut self, start: usize, error: &Error) {
        for member in &mut self.members[start..] {
            member.record(Err(Error::Connection {
                address: self.address.clone(),
                message: error.to_string(),
            }));
        }
    }
}
