//! chitta - thin CLI client for the chitta daemon
//!
//! Invokes tools through the daemon socket: `chitta <tool> --param value …`.
//! `chitta <tool> --help` prints the parameter table derived from the same
//! taxonomy the daemon validates against; `--json` emits the structured
//! result only. Exit codes: 0 success, 1 error (message on stderr).

use clap::Parser;
use colored::Colorize;
use serde_json::{json, Map, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use chitta_daemon::default_socket_path;
use chitta_daemon::protocol::{JsonRpcResponse, PROTOCOL_MAJOR};
use chitta_daemon::tools::{self, ParamKind, ToolSpec};

/// Chitta - persistent semantic memory CLI
#[derive(Parser)]
#[command(name = "chitta")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI client for the chitta memory daemon")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Tool to invoke (run with no tool to list them)
    tool: Option<String>,

    /// Emit the structured result as JSON only
    #[arg(long)]
    json: bool,

    /// Socket path override (default: versioned /tmp socket or SOCKET_PATH)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Print help
    #[arg(long, short = 'h')]
    help: bool,

    /// Tool parameters as --name value pairs
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    params: Vec<String>,
}

fn main() {
    let cli = Cli::parse();

    let tool_name = match &cli.tool {
        None => {
            print_tool_list();
            std::process::exit(if cli.help { 0 } else { 1 });
        }
        Some(name) => name.clone(),
    };

    let Some(spec) = tools::find(&tool_name) else {
        eprintln!("{} unknown tool '{tool_name}'", "error:".red());
        eprintln!("Run 'chitta' to list tools.");
        std::process::exit(1);
    };

    if cli.help || cli.params.iter().any(|p| p == "--help" || p == "-h") {
        print_tool_help(spec);
        std::process::exit(0);
    }

    let arguments = match parse_params(spec, &cli.params) {
        Ok(map) => map,
        Err(message) => {
            eprintln!("{} {message}", "error:".red());
            std::process::exit(1);
        }
    };

    let socket_path = cli.socket.unwrap_or_else(default_socket_path);
    match invoke(&socket_path, &tool_name, arguments) {
        Ok(result) => {
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&result["structured"]).unwrap_or_default()
                );
            } else if let Some(lines) = result["content"].as_array() {
                for line in lines {
                    if let Some(text) = line.as_str() {
                        println!("{text}");
                    }
                }
            }
        }
        Err(message) => {
            eprintln!("{} {message}", "error:".red());
            std::process::exit(1);
        }
    }
}

fn print_tool_list() {
    println!("{}", "chitta tools".bold());
    println!();
    for tool in tools::taxonomy() {
        println!("  {:<16} {}", tool.name.green(), tool.description);
    }
    println!();
    println!("Run 'chitta <tool> --help' for the parameter table.");
}

fn print_tool_help(spec: &ToolSpec) {
    println!("{} - {}", spec.name.bold(), spec.description);
    println!();
    if spec.params.is_empty() {
        println!("No parameters.");
        return;
    }
    println!("PARAMETERS:");
    for param in &spec.params {
        let requirement = if param.required {
            "required".red().to_string()
        } else if let Some(default) = &param.default {
            format!("default: {default}")
        } else {
            "optional".to_string()
        };
        println!(
            "  --{:<18} {:<12} ({requirement}) {}",
            param.name,
            param.kind.as_str(),
            param.description
        );
    }
}

/// Parse `--name value` pairs against the tool's parameter table
fn parse_params(spec: &ToolSpec, raw: &[String]) -> Result<Map<String, Value>, String> {
    let mut arguments = Map::new();
    let mut i = 0;
    while i < raw.len() {
        let flag = raw[i]
            .strip_prefix("--")
            .ok_or_else(|| format!("expected --parameter, got '{}'", raw[i]))?;
        let param = spec
            .params
            .iter()
            .find(|p| p.name == flag)
            .ok_or_else(|| format!("unknown parameter '--{flag}' for '{}'", spec.name))?;

        // bools may be bare flags
        let value = if param.kind == ParamKind::Bool
            && raw.get(i + 1).is_none_or(|next| next.starts_with("--"))
        {
            i += 1;
            json!(true)
        } else {
            let raw_value = raw
                .get(i + 1)
                .ok_or_else(|| format!("--{flag} requires a value"))?;
            i += 2;
            match param.kind {
                ParamKind::String => json!(raw_value),
                ParamKind::Integer => json!(raw_value
                    .parse::<i64>()
                    .map_err(|_| format!("--{flag} must be an integer"))?),
                ParamKind::Float => json!(raw_value
                    .parse::<f64>()
                    .map_err(|_| format!("--{flag} must be a number"))?),
                ParamKind::Bool => json!(raw_value
                    .parse::<bool>()
                    .map_err(|_| format!("--{flag} must be true or false"))?),
                ParamKind::StringList => json!(raw_value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()),
            }
        };
        arguments.insert(param.name.to_string(), value);
    }
    Ok(arguments)
}

/// One request-response session: initialize, then the tool call
fn invoke(
    socket_path: &std::path::Path,
    tool: &str,
    arguments: Map<String, Value>,
) -> Result<Value, String> {
    let stream = UnixStream::connect(socket_path).map_err(|e| {
        format!(
            "cannot reach daemon at {} ({e}); is chittad running?",
            socket_path.display()
        )
    })?;
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .map_err(|e| e.to_string())?;
    let mut writer = stream.try_clone().map_err(|e| e.to_string())?;
    let mut reader = BufReader::new(stream);

    let version = call(
        &mut writer,
        &mut reader,
        &json!({"jsonrpc": "2.0", "id": 0, "method": "version_check",
                "params": {"major": PROTOCOL_MAJOR}}),
    )?;
    if version["compatible"] == json!(false) {
        return Err(format!(
            "daemon speaks protocol {}.{}, client speaks {PROTOCOL_MAJOR}.x; restart the daemon",
            version["major"], version["minor"]
        ));
    }

    call(
        &mut writer,
        &mut reader,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
    )?;
    call(
        &mut writer,
        &mut reader,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": tool, "arguments": arguments}}),
    )
}

fn call(
    writer: &mut UnixStream,
    reader: &mut BufReader<UnixStream>,
    request: &Value,
) -> Result<Value, String> {
    let mut line = serde_json::to_string(request).map_err(|e| e.to_string())?;
    line.push('\n');
    writer.write_all(line.as_bytes()).map_err(|e| e.to_string())?;
    writer.flush().map_err(|e| e.to_string())?;

    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .map_err(|e| format!("read failed: {e}"))?;
    let response: JsonRpcResponse =
        serde_json::from_str(&response_line).map_err(|e| format!("bad response: {e}"))?;
    if let Some(error) = response.error {
        return Err(error.message);
    }
    response.result.ok_or_else(|| "empty response".to_string())
}
