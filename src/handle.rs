//! Remote object handles.
//!
//! A handle is the identity of a buffer, window or tab page that lives in
//! the remote process. It carries no local state: two handles decoded from
//! the same remote identity at different times compare equal.

use std::fmt;

/// The kind of remote object a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    Buffer,
    Window,
    Tabpage,
}

impl HandleKind {
    pub const ALL: [HandleKind; 3] = [HandleKind::Buffer, HandleKind::Window, HandleKind::Tabpage];

    /// msgpack ext type code used on the wire.
    pub fn ext_type(&self) -> i8 {
        match self {
            HandleKind::Buffer => 0,
            HandleKind::Window => 1,
            HandleKind::Tabpage => 2,
        }
    }

    pub fn from_ext_type(code: i8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.ext_type() == code)
    }

    /// Prefix of the remote methods that take this kind as receiver.
    pub fn method_prefix(&self) -> &'static str {
        match self {
            HandleKind::Buffer => "nvim_buf_",
            HandleKind::Window => "nvim_win_",
            HandleKind::Tabpage => "nvim_tabpage_",
        }
    }

    /// Type name used by the remote's API metadata.
    pub fn name(&self) -> &'static str {
        match self {
            HandleKind::Buffer => "Buffer",
            HandleKind::Window => "Window",
            HandleKind::Tabpage => "Tabpage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A (kind, identity) reference to a remote object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    kind: HandleKind,
    id: i64,
}

impl Handle {
    pub fn new(kind: HandleKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn buffer(id: i64) -> Self {
        Self::new(HandleKind::Buffer, id)
    }

    pub fn window(id: i64) -> Self {
        Self::new(HandleKind::Window, id)
    }

    pub fn tabpage(id: i64) -> Self {
        Self::new(HandleKind::Tabpage, id)
    }

    pub fn kind(&self) -> HandleKind {
        self.kind
    }

    pub fn id(&self) -> i64 {
        self.id
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.kind, self.id)
    }
}
