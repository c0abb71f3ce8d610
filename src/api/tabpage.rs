//! Tab page proxy.

use crate::api::{handle_proxy, remote_methods, Returns};
use crate::handle::HandleKind;
use crate::value::Value;

use super::Window;

handle_proxy! {
    /// A tab page in the remote editor.
    Tabpage, HandleKind::Tabpage, TABPAGE_METHODS, ["nvim_tabpage_"]
}

remote_methods! {
    Tabpage, TABPAGE_METHODS;

    get_windows() -> Vec<Window> = "nvim_tabpage_list_wins" as Returns::HandleList(HandleKind::Window);
    get_var(name: &str) -> Value = "nvim_tabpage_get_var";
    set_var(name: &str, value: Value) -> Value = "nvim_tabpage_set_var";
    del_var(name: &str) -> Value = "nvim_tabpage_del_var";
    get_window() -> Window = "nvim_tabpage_get_win" as Returns::Handle(HandleKind::Window);
    is_valid() -> bool = "nvim_tabpage_is_valid";
}
