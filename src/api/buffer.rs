//! Buffer proxy.

use crate::api::{handle_proxy, remote_methods};
use crate::handle::HandleKind;
use crate::value::Value;

handle_proxy! {
    /// A buffer in the remote editor.
    Buffer, HandleKind::Buffer, BUFFER_METHODS, ["nvim_buf_", "buffer_"]
}

remote_methods! {
    Buffer, BUFFER_METHODS;

    line_count() -> i64 = "nvim_buf_line_count";
    get_line(index: i64) -> String = "buffer_get_line";
    set_line(index: i64, line: &str) -> () = "buffer_set_line";
    del_line(index: i64) -> () = "buffer_del_line";
    get_line_slice(start: i64, end: i64, include_start: bool, include_end: bool) -> Vec<String>
        = "buffer_get_line_slice";
    /// Lines `[start, end)`, zero-based. Negative indices count from the end.
    get_lines(start: i64, end: i64, strict_indexing: bool) -> Vec<String> = "nvim_buf_get_lines";
    set_line_slice(
        start: i64,
        end: i64,
        include_start: bool,
        include_end: bool,
        replacement: &[&str],
    ) -> () = "buffer_set_line_slice";
    /// Replace lines `[start, end)` with `replacement`.
    set_lines(start: i64, end: i64, strict_indexing: bool, replacement: &[&str]) -> ()
        = "nvim_buf_set_lines";

    get_var(name: &str) -> Value = "nvim_buf_get_var";
    set_var(name: &str, value: Value) -> Value = "nvim_buf_set_var";
    del_var(name: &str) -> Value = "nvim_buf_del_var";
    get_option(name: &str) -> Value = "nvim_buf_get_option";
    set_option(name: &str, value: Value) -> () = "nvim_buf_set_option";

    get_number() -> i64 = "nvim_buf_get_number";
    get_name() -> String = "nvim_buf_get_name";
    set_name(name: &str) -> () = "nvim_buf_set_name";
    is_valid() -> bool = "nvim_buf_is_valid";
    insert(lnum: i64, lines: &[&str]) -> () = "buffer_insert";
    /// `(row, col)` of the mark `name`.
    get_mark(name: &str) -> Vec<i64> = "nvim_buf_get_mark";
    add_highlight(src_id: i64, hl_group: &str, line: i64, col_start: i64, col_end: i64) -> i64
        = "nvim_buf_add_highlight";
    clear_highlight(src_id: i64, line_start: i64, line_end: i64) -> () = "nvim_buf_clear_highlight";
}
