//! Typed proxies over a [`Session`].
//!
//! Every remote method is one [`MethodSpec`] entry. The typed async methods
//! on [`Nvim`], [`Buffer`], [`Window`] and [`Tabpage`] and the static tables
//! used by the generic [`invoke`](Buffer::invoke) path are generated from
//! the same `remote_methods!` list, so adding a method is a one-line edit.
//!
//! # Example
//!
//! ```ignore
//! let nvim = session.nvim();
//! let buf = nvim.get_current_buffer().await?;
//! buf.set_lines(0, -1, false, &["hello"]).await?;
//! assert_eq!(nvim.eval("1 + 1").await?, Value::Integer(2));
//! ```

pub mod buffer;
pub mod info;
pub mod nvim;
pub mod tabpage;
pub mod window;

pub use buffer::{Buffer, BUFFER_METHODS};
pub use info::ApiInfo;
pub use nvim::{Nvim, NVIM_METHODS};
pub use tabpage::{Tabpage, TABPAGE_METHODS};
pub use window::{Window, WINDOW_METHODS};

use crate::error::{Error, Result};
use crate::handle::{Handle, HandleKind};
use crate::rpc::Session;
use crate::value::Value;

/// What a method's result means, beyond its raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Returns {
    Value,
    /// A single object of this kind.
    Handle(HandleKind),
    /// An array of objects of this kind.
    HandleList(HandleKind),
}

impl Returns {
    /// Wrap raw integer identities into handles where the method returns
    /// objects. Values that are already handles pass through.
    pub fn wrap(self, value: Value) -> Value {
        match (self, value) {
            (Returns::Handle(kind), Value::Integer(id)) => Value::Handle(Handle::new(kind, id)),
            (Returns::HandleList(kind), Value::Array(items)) => Value::Array(
                items
                    .into_iter()
                    .map(|item| Returns::Handle(kind).wrap(item))
                    .collect(),
            ),
            (_, value) => value,
        }
    }
}

/// One entry of a proxy's method table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodSpec {
    /// Remote method name as sent on the wire.
    pub name: &'static str,
    /// Name of the typed Rust method.
    pub alias: &'static str,
    /// Positional parameters, not counting the receiver.
    pub params: &'static [&'static str],
    pub returns: Returns,
}

impl MethodSpec {
    /// Reject argument lists that do not match the parameter list.
    pub fn check_arity(&self, got: usize) -> Result<()> {
        let expected = self.params.len();
        if got < expected {
            return Err(Error::MissingArgument {
                method: self.name,
                param: self.params[got],
            });
        }
        if got > expected {
            return Err(Error::TooManyArguments {
                method: self.name,
                expected,
                got,
            });
        }
        Ok(())
    }

    fn matches(&self, name: &str, prefixes: &[&str]) -> bool {
        self.name == name
            || self.alias == name
            || prefixes
                .iter()
                .any(|prefix| self.name.strip_prefix(prefix) == Some(name))
    }
}

/// A proxy that forwards method calls to the remote.
pub trait Remote: Sync {
    /// The method table for this proxy type.
    const METHODS: &'static [MethodSpec];
    /// Prefixes stripped to form short method names.
    const PREFIXES: &'static [&'static str];

    fn session(&self) -> &Session;

    /// Handle prepended to every call's arguments, if any.
    fn receiver(&self) -> Option<Handle>;
}

/// Find a method of `T` by wire name, Rust name or short name.
pub fn lookup<T: Remote>(name: &str) -> Result<&'static MethodSpec> {
    T::METHODS
        .iter()
        .find(|spec| spec.matches(name, T::PREFIXES))
        .ok_or_else(|| Error::UnknownMethod(name.to_string()))
}

/// Validate, forward to the session and wrap returned handles.
pub(crate) async fn forward<T: Remote>(target: &T, spec: &MethodSpec, args: Vec<Value>) -> Result<Value> {
    spec.check_arity(args.len())?;

    let mut full = Vec::with_capacity(args.len() + 1);
    if let Some(receiver) = target.receiver() {
        full.push(Value::Handle(receiver));
    }
    full.extend(args);

    let value = target.session().call(spec.name, full).await?;
    Ok(spec.returns.wrap(value))
}

pub(crate) async fn invoke<T: Remote>(target: &T, name: &str, args: Vec<Value>) -> Result<Value> {
    let spec = lookup::<T>(name)?;
    forward(target, spec, args).await
}

macro_rules! method_returns {
    () => {
        $crate::api::Returns::Value
    };
    ($returns:expr) => {
        $returns
    };
}

/// Generate a method table and the matching typed methods.
///
/// ```ignore
/// remote_methods! {
///     Buffer, BUFFER_METHODS;
///     line_count() -> i64 = "nvim_buf_line_count";
///     get_window() -> Window = "nvim_tabpage_get_win" as Returns::Handle(HandleKind::Window);
/// }
/// ```
macro_rules! remote_methods {
    (
        $target:ident, $table:ident;
        $(
            $(#[$attr:meta])*
            $method:ident($($param:ident: $ty:ty),* $(,)?) -> $ret:ty = $name:literal $(as $returns:expr)?;
        )*
    ) => {
        pub const $table: &[$crate::api::MethodSpec] = &[
            $(
                $crate::api::MethodSpec {
                    name: $name,
                    alias: stringify!($method),
                    params: &[$(stringify!($param)),*],
                    returns: $crate::api::method_returns!($($returns)?),
                },
            )*
        ];

        impl $target {
            $(
                $(#[$attr])*
                pub async fn $method(&self, $($param: $ty),*) -> $crate::error::Result<$ret> {
                    const SPEC: $crate::api::MethodSpec = $crate::api::MethodSpec {
                        name: $name,
                        alias: stringify!($method),
                        params: &[$(stringify!($param)),*],
                        returns: $crate::api::method_returns!($($returns)?),
                    };
                    let args: Vec<$crate::value::Value> = vec![$($crate::value::Value::from($param)),*];
                    let value = $crate::api::forward(self, &SPEC, args).await?;
                    <$ret as $crate::value::FromValue>::from_value(value, &self.session)
                }
            )*
        }
    };
}

/// Define a handle-backed proxy type.
///
/// Equality and hashing use the handle only: two proxies for the same
/// remote object compare equal even when they came from different decodes.
macro_rules! handle_proxy {
    ($(#[$attr:meta])* $proxy:ident, $kind:expr, $table:ident, [$($prefix:literal),+]) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $proxy {
            handle: $crate::handle::Handle,
            session: $crate::rpc::Session,
        }

        impl $proxy {
            pub const KIND: $crate::handle::HandleKind = $kind;

            pub fn new(session: $crate::rpc::Session, id: i64) -> Self {
                Self {
                    handle: $crate::handle::Handle::new($kind, id),
                    session,
                }
            }

            /// Bind a handle of the right kind to `session`.
            pub fn from_handle(
                session: $crate::rpc::Session,
                handle: $crate::handle::Handle,
            ) -> $crate::error::Result<Self> {
                if handle.kind() != $kind {
                    return Err($crate::error::Error::UnexpectedValue {
                        expected: $kind.name(),
                        got: handle.kind().name().to_string(),
                    });
                }
                Ok(Self { handle, session })
            }

            pub fn handle(&self) -> $crate::handle::Handle {
                self.handle
            }

            pub fn id(&self) -> i64 {
                self.handle.id()
            }

            pub fn session(&self) -> &$crate::rpc::Session {
                &self.session
            }

            /// Call any method from this type's table by name. The
            /// receiver is supplied automatically.
            pub async fn invoke(
                &self,
                name: &str,
                args: Vec<$crate::value::Value>,
            ) -> $crate::error::Result<$crate::value::Value> {
                $crate::api::invoke(self, name, args).await
            }
        }

        impl $crate::api::Remote for $proxy {
            const METHODS: &'static [$crate::api::MethodSpec] = $table;
            const PREFIXES: &'static [&'static str] = &[$($prefix),+];

            fn session(&self) -> &$crate::rpc::Session {
                &self.session
            }

            fn receiver(&self) -> Option<$crate::handle::Handle> {
                Some(self.handle)
            }
        }

        impl PartialEq for $proxy {
            fn eq(&self, other: &Self) -> bool {
                self.handle == other.handle
            }
        }

        impl Eq for $proxy {}

        impl std::hash::Hash for $proxy {
            fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
                std::hash::Hash::hash(&self.handle, state);
            }
        }

        impl std::fmt::Debug for $proxy {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.handle)
            }
        }

        impl From<&$proxy> for $crate::value::Value {
            fn from(proxy: &$proxy) -> Self {
                $crate::value::Value::Handle(proxy.handle)
            }
        }

        impl $crate::value::FromValue for $proxy {
            fn from_value(
                value: $crate::value::Value,
                session: &$crate::rpc::Session,
            ) -> $crate::error::Result<Self> {
                match value {
                    $crate::value::Value::Handle(handle) => Self::from_handle(session.clone(), handle),
                    $crate::value::Value::Integer(id) => Ok(Self::new(session.clone(), id)),
                    other => Err($crate::error::Error::unexpected($kind.name(), &other)),
                }
            }
        }
    };
}

pub(crate) use handle_proxy;
pub(crate) use method_returns;
pub(crate) use remote_methods;

/// Every method table, for catalogue checks.
pub fn all_methods() -> impl Iterator<Item = &'static MethodSpec> {
    NVIM_METHODS
        .iter()
        .chain(BUFFER_METHODS)
        .chain(WINDOW_METHODS)
        .chain(TABPAGE_METHODS)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_returns_wrap() {
        assert_eq!(
            Returns::Handle(HandleKind::Buffer).wrap(Value::Integer(3)),
            Value::Handle(Handle::buffer(3))
        );
        assert_eq!(
            Returns::HandleList(HandleKind::Window).wrap(Value::Array(vec![
                Value::Integer(1000),
                Value::Handle(Handle::window(1001)),
            ])),
            Value::Array(vec![
                Value::Handle(Handle::window(1000)),
                Value::Handle(Handle::window(1001)),
            ])
        );
        assert_eq!(Returns::Value.wrap(Value::Integer(3)), Value::Integer(3));
    }

    #[test]
    fn test_check_arity() {
        let spec = lookup::<Buffer>("set_lines").unwrap();
        assert!(spec.check_arity(4).is_ok());
        match spec.check_arity(3) {
            Err(Error::MissingArgument { method, param }) => {
                assert_eq!(method, "nvim_buf_set_lines");
                assert_eq!(param, "replacement");
            }
            other => panic!("Expected MissingArgument, got {:?}", other),
        }
        assert!(matches!(
            spec.check_arity(5),
            Err(Error::TooManyArguments { expected: 4, got: 5, .. })
        ));
    }

    #[test]
    fn test_lookup_by_any_name() {
        let full = lookup::<Buffer>("nvim_buf_get_lines").unwrap();
        let short = lookup::<Buffer>("get_lines").unwrap();
        assert_eq!(full, short);

        let deprecated = lookup::<Buffer>("get_line").unwrap();
        assert_eq!(deprecated.name, "buffer_get_line");

        let by_alias = lookup::<Window>("get_buffer").unwrap();
        assert_eq!(by_alias.name, "nvim_win_get_buf");
        assert_eq!(by_alias.returns, Returns::Handle(HandleKind::Buffer));

        assert!(matches!(lookup::<Tabpage>("get_lines"), Err(Error::UnknownMethod(_))));
    }

    #[test]
    fn test_tables_have_unique_names() {
        for table in [NVIM_METHODS, BUFFER_METHODS, WINDOW_METHODS, TABPAGE_METHODS] {
            let names: HashSet<_> = table.iter().map(|spec| spec.name).collect();
            assert_eq!(names.len(), table.len());
            let aliases: HashSet<_> = table.iter().map(|spec| spec.alias).collect();
            assert_eq!(aliases.len(), table.len());
        }
    }

    #[test]
    fn test_handle_tables_use_receiver_prefixes() {
        for spec in BUFFER_METHODS {
            assert!(
                spec.name.starts_with("nvim_buf_") || spec.name.starts_with("buffer_"),
                "{}",
                spec.name
            );
        }
        for spec in WINDOW_METHODS {
            assert!(spec.name.starts_with(HandleKind::Window.method_prefix()), "{}", spec.name);
        }
        for spec in TABPAGE_METHODS {
            assert!(spec.name.starts_with(HandleKind::Tabpage.method_prefix()), "{}", spec.name);
        }
    }
}
