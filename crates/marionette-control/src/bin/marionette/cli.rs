//! CLI definitions for marionette.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "marionette",
    version,
    about = "Remote control for live GUI object trees",
    after_help = "Examples:\n  marionette serve --scene demo.toml\n  marionette ctl highlight main_window --timeout-ms 2000\n  marionette ctl get webview.JSContext.state label\n  marionette ctl watch"
)]
pub struct Cli {
    /// Show debug logging.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a headless application from a scene file and serve it.
    Serve {
        /// Host configuration (TOML).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scene description (TOML).
        #[arg(long)]
        scene: PathBuf,
        /// Control endpoint override (tcp://host:port or unix://path).
        #[arg(long)]
        endpoint: Option<String>,
    },
    /// Send one control request to a running host.
    Ctl {
        /// Control endpoint (tcp://host:port or unix://path).
        #[arg(long)]
        endpoint: Option<String>,
        /// Host configuration to read the endpoint from.
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(subcommand)]
        action: ControlAction,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ControlAction {
    /// Highlight a widget.
    Highlight {
        object: String,
        /// Remove the highlight after this many milliseconds (0 keeps it).
        #[arg(long, default_value_t = 0)]
        timeout_ms: u32,
    },
    /// Remove a highlight.
    Unhighlight { object: String },
    /// Show a message next to a widget.
    Message {
        id: String,
        /// Widget the message points at.
        #[arg(long)]
        relative_to: String,
        #[arg(long, default_value = "")]
        text: String,
        #[arg(long, default_value = "")]
        icon_name: String,
        /// Close the message after this many milliseconds (0 keeps it).
        #[arg(long, default_value_t = 0)]
        timeout_ms: u32,
    },
    /// Close a message.
    MessageClear { id: String },
    /// Set a property.
    Set {
        object: String,
        property: String,
        /// Wire value as JSON, e.g. '{"type":"string","value":"Hi"}'.
        value: String,
    },
    /// Read a property.
    Get { object: String, property: String },
    /// Subscribe to a signal.
    Connect {
        object: String,
        signal: String,
        /// Signal detail, required for notify.
        #[arg(long)]
        detail: Option<String>,
        /// Keep the connection open and print events.
        #[arg(long)]
        follow: bool,
    },
    /// Emit an action signal.
    Emit {
        object: String,
        signal: String,
        #[arg(long)]
        detail: Option<String>,
        /// Parameters as a JSON array of wire values.
        #[arg(long, default_value = "[]")]
        params: String,
    },
    /// Export an object and print its introspection document.
    Export { object: String },
    /// Replace the application stylesheet.
    SetCss { css: String },
    /// Print the application stylesheet.
    GetCss,
    /// Print broadcast events until interrupted.
    Watch,
}
