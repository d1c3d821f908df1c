use crate::cluster::redirect::{parse_redis_error, Redirect};
use crate::core::command::Cmd;
use crate::proto::frame::Frame;
use crate::{Error, Result};

/// Maximum executions of one command per flush: the initial attempt plus one
/// redirect.
pub(crate) const MAX_ATTEMPTS: u8 = 2;

/// A queued command together with its routing and result state.
#[derive(Debug)]
pub(crate) struct PipelineCommand {
    cmd: Cmd,
    slot: Option<u16>,
    address: Option<String>,
    reply: Option<Result<Frame>>,
    redirect: Option<Redirect>,
    attempts: u8,
}

impl PipelineCommand {
    pub(crate) fn new(cmd: Cmd) -> Self {
        Self {
            cmd,
            slot: None,
            address: None,
            reply: None,
            redirect: None,
            attempts: 0,
        }
    }

    pub(crate) fn cmd(&self) -> &Cmd {
        &self.cmd
    }

    pub(crate) fn set_slot(&mut self, slot: Option<u16>) {
        self.slot = slot;
    }

    pub(crate) fn attempts(&self) -> u8 {
        self.attempts
    }

    pub(crate) fn redirect(&self) -> Option<&Redirect> {
        self.redirect.as_ref()
    }

    /// Binds the command to the node that owns its slot, or records why no
    /// node could be found.
    pub(crate) fn route(&mut self, address: Option<String>) {
        match address {
            Some(address) => self.address = Some(address),
            None => {
                let message = match self.slot {
                    Some(slot) => format!("no node found for slot {}", slot),
                    None => "no node found for keyless command".to_string(),
                };
                self.reply = Some(Err(Error::Protocol { message }));
            }
        }
    }

    /// Address for the initial pass, if the command was routed.
    pub(crate) fn initial_target(&self) -> Option<&str> {
        if self.attempts == 0 && self.reply.is_none() {
            self.address.as_deref()
        } else {
            None
        }
    }

    /// Re-targets a command redirected on its first attempt and returns its
    /// new address. Commands already at the attempt limit are left alone.
    pub(crate) fn redirect_target(&mut self) -> Option<String> {
        if self.attempts >= MAX_ATTEMPTS {
            return None;
        }
        let address = self.redirect.as_ref()?.address.clone();
        self.address = Some(address.clone());
        Some(address)
    }

    /// Records the outcome of one execution.
    ///
    /// Error replies are decoded so that MOVED/ASK become redirects.
    pub(crate) fn record(&mut self, reply: Result<Frame>) {
        debug_assert!(self.attempts < MAX_ATTEMPTS);
        self.attempts += 1;
        let reply = match reply {
            Ok(Frame::Error(msg)) => Err(parse_redis_error(&msg)),
            other => other,
        };
        self.redirect = reply.as_ref().err().and_then(Redirect::from_error);
        self.reply = Some(reply);
    }

    /// Hands out the final reply. A command that was never executed reads as null.
    pub(crate) fn take_reply(&mut self) -> Result<Frame> {
        self.reply.take().unwrap_or(Ok(Frame::Null))
    }
}
