//! The top-level proxy: editor-wide methods.

use crate::api::{remote_methods, ApiInfo, MethodSpec, Remote, Returns};
use crate::error::{Error, Result};
use crate::handle::{Handle, HandleKind};
use crate::rpc::Session;
use crate::value::Value;

use super::{Buffer, Tabpage, Window};

/// Editor-wide methods on a session.
///
/// Two `Nvim` values are equal when they drive the same connection.
#[derive(Debug, Clone)]
pub struct Nvim {
    session: Session,
}

impl Nvim {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Call any editor-wide method by name.
    pub async fn invoke(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        super::invoke(self, name, args).await
    }

    /// Quit the editor, discarding changes. The remote usually drops the
    /// connection before answering, which counts as success here.
    pub async fn quit(&self) -> Result<()> {
        match self.command("qa!").await {
            Ok(()) | Err(Error::ConnectionClosed) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// [`get_api_info`](Self::get_api_info), parsed.
    pub async fn api_info(&self) -> Result<ApiInfo> {
        let raw = self.get_api_info().await?;
        ApiInfo::parse(&raw)
    }
}

impl Session {
    /// Editor-wide proxy for this session.
    pub fn nvim(&self) -> Nvim {
        Nvim::new(self.clone())
    }
}

impl PartialEq for Nvim {
    fn eq(&self, other: &Self) -> bool {
        self.session.ptr_eq(&other.session)
    }
}

impl Eq for Nvim {}

impl Remote for Nvim {
    const METHODS: &'static [MethodSpec] = NVIM_METHODS;
    const PREFIXES: &'static [&'static str] = &["nvim_"];

    fn session(&self) -> &Session {
        &self.session
    }

    fn receiver(&self) -> Option<Handle> {
        None
    }
}

remote_methods! {
    Nvim, NVIM_METHODS;

    /// Register as a UI of `width` x `height` cells.
    ui_attach(width: i64, height: i64, rgb: bool) -> () = "ui_attach";
    ui_detach() -> () = "nvim_ui_detach";
    ui_try_resize(width: i64, height: i64) -> () = "nvim_ui_try_resize";

    /// Run an Ex command.
    command(command: &str) -> () = "nvim_command";
    feedkeys(keys: &str, mode: &str, escape_csi: bool) -> () = "nvim_feedkeys";
    /// Queue raw user input. Returns the number of bytes written.
    input(keys: &str) -> i64 = "nvim_input";
    replace_termcodes(text: &str, from_part: bool, do_lt: bool, special: bool) -> String
        = "nvim_replace_termcodes";
    command_output(command: &str) -> String = "nvim_command_output";
    /// Evaluate a Vimscript expression.
    eval(expr: &str) -> Value = "nvim_eval";
    call_function(fname: &str, args: Vec<Value>) -> Value = "nvim_call_function";
    strwidth(text: &str) -> i64 = "nvim_strwidth";
    list_runtime_paths() -> Vec<String> = "nvim_list_runtime_paths";
    change_directory(dir: &str) -> () = "nvim_set_current_dir";

    get_current_line() -> String = "nvim_get_current_line";
    set_current_line(line: &str) -> () = "nvim_set_current_line";
    del_current_line() -> () = "nvim_del_current_line";

    get_var(name: &str) -> Value = "nvim_get_var";
    set_var(name: &str, value: Value) -> Value = "nvim_set_var";
    del_var(name: &str) -> Value = "nvim_del_var";
    get_vvar(name: &str) -> Value = "nvim_get_vvar";
    get_option(name: &str) -> Value = "nvim_get_option";
    set_option(name: &str, value: Value) -> () = "nvim_set_option";

    out_write(text: &str) -> () = "nvim_out_write";
    err_write(text: &str) -> () = "nvim_err_write";
    /// Write `text` plus a newline to the error area.
    report_error(text: &str) -> () = "nvim_err_writeln";

    get_buffers() -> Vec<Buffer> = "nvim_list_bufs" as Returns::HandleList(HandleKind::Buffer);
    get_current_buffer() -> Buffer = "nvim_get_current_buf" as Returns::Handle(HandleKind::Buffer);
    set_current_buffer(buffer: &Buffer) -> () = "nvim_set_current_buf";
    get_windows() -> Vec<Window> = "nvim_list_wins" as Returns::HandleList(HandleKind::Window);
    get_current_window() -> Window = "nvim_get_current_win" as Returns::Handle(HandleKind::Window);
    set_current_window(window: &Window) -> () = "nvim_set_current_win";
    get_tabpages() -> Vec<Tabpage> = "nvim_list_tabpages" as Returns::HandleList(HandleKind::Tabpage);
    get_current_tabpage() -> Tabpage
        = "nvim_get_current_tabpage" as Returns::Handle(HandleKind::Tabpage);
    set_current_tabpage(tabpage: &Tabpage) -> () = "nvim_set_current_tabpage";

    /// Ask the remote to broadcast `event` to this session.
    subscribe(event: &str) -> () = "nvim_subscribe";
    unsubscribe(event: &str) -> () = "nvim_unsubscribe";

    name_to_color(name: &str) -> i64 = "nvim_get_color_by_name";
    get_color_map() -> Value = "nvim_get_color_map";
    /// `[channel_id, metadata]`. See [`ApiInfo`].
    get_api_info() -> Value = "nvim_get_api_info";
}
