use crate::proto::frame::Frame;
use bytes::Bytes;

/// A command ready to be queued on a pipeline or sent to a node.
///
/// The name is kept apart from the arguments so routing can look at the
/// command name and its key arguments without re-parsing the frame.
///
/// # Example
///
/// ```
/// use slotpipe::Cmd;
///
/// let cmd = Cmd::new("SET").arg("key").arg("value");
/// assert_eq!(cmd.name(), &b"SET"[..]);
/// assert_eq!(cmd.args().len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Cmd {
    name: Bytes,
    args: Vec<Bytes>,
}

impl Cmd {
    /// Creates a new command with the given name.
    ///
    /// # Arguments
    ///
    /// * `name` - The command name (e.g., "GET", "MSET")
    #[inline]
    pub fn new(name: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument to the command.
    #[inline]
    pub fn arg<T: Into<Bytes>>(mut self, arg: T) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends every argument yielded by `args`.
    #[inline]
    pub fn args_from<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The command name as sent on the wire.
    #[inline]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// The arguments following the command name.
    #[inline]
    pub fn args(&self) -> &[Bytes] {
        &self.args
    }

    /// Returns true if the command name equals `name`, ignoring ASCII case.
    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name.as_bytes())
    }

    /// Builds the RESP array frame for this command.
    pub fn to_frame(&self) -> Frame {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(Frame::BulkString(Some(self.name.clone())));
        items.extend(self.args.iter().map(|a| Frame::BulkString(Some(a.clone()))));
        Frame::Array(items)
    }
}

/// Creates a GET command.
#[inline]
pub fn get(key: impl Into<Bytes>) -> Cmd {
    Cmd::new("GET").arg(key)
}

/// Creates a SET command.
#[inline]
pub fn set(key: impl Into<Bytes>, value: impl Into<Bytes>) -> Cmd {
    Cmd::new("SET").arg(key).arg(value)
}

/// Creates a MGET command for keys that share one slot.
#[inline]
pub fn mget<I, K>(keys: I) -> Cmd
where
    I: IntoIterator<Item = K>,
    K: Into<Bytes>,
{
    Cmd::new("MGET").args_from(keys)
}

/// Creates a MSET command for key/value pairs that share one slot.
pub fn mset<I, K, V>(pairs: I) -> Cmd
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<Bytes>,
    V: Into<Bytes>,
{
    let mut cmd = Cmd::new("MSET");
    for (key, value) in pairs {
        cmd = cmd.arg(key).arg(value);
    }
    cmd
}
