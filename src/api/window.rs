//! Window proxy.

use crate::api::{handle_proxy, remote_methods, Returns};
use crate::handle::HandleKind;
use crate::value::Value;

use super::{Buffer, Tabpage};

handle_proxy! {
    /// A window in the remote editor.
    Window, HandleKind::Window, WINDOW_METHODS, ["nvim_win_"]
}

remote_methods! {
    Window, WINDOW_METHODS;

    get_buffer() -> Buffer = "nvim_win_get_buf" as Returns::Handle(HandleKind::Buffer);
    /// `(row, col)`: one-based row, zero-based byte column.
    get_cursor() -> Vec<i64> = "nvim_win_get_cursor";
    set_cursor(pos: (i64, i64)) -> () = "nvim_win_set_cursor";
    get_height() -> i64 = "nvim_win_get_height";
    set_height(height: i64) -> () = "nvim_win_set_height";
    get_width() -> i64 = "nvim_win_get_width";
    set_width(width: i64) -> () = "nvim_win_set_width";

    get_var(name: &str) -> Value = "nvim_win_get_var";
    set_var(name: &str, value: Value) -> Value = "nvim_win_set_var";
    del_var(name: &str) -> Value = "nvim_win_del_var";
    get_option(name: &str) -> Value = "nvim_win_get_option";
    set_option(name: &str, value: Value) -> () = "nvim_win_set_option";

    get_position() -> Vec<i64> = "nvim_win_get_position";
    get_tabpage() -> Tabpage = "nvim_win_get_tabpage" as Returns::Handle(HandleKind::Tabpage);
    is_valid() -> bool = "nvim_win_is_valid";
}
