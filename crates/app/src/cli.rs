//! Command-line parsing for fragtool. Flags use `--key=value` prefixes.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use fragments::{CategoryId, ConversionSettings, ExportOptions};

pub const USAGE: &str = "\
usage:
  fragtool convert <in.obj> [--out=<file.frag>] [--exclude=<c1,c2>] [--coordinate-to-origin] [--compress=on|off]
  fragtool info <file.frag>...
  fragtool bounds <file.frag>... [--each]
  fragtool dispose-demo <file.frag>";

#[derive(Debug, PartialEq)]
pub enum Command {
    Convert {
        input: PathBuf,
        output: PathBuf,
        settings: ConversionSettings,
        export: ExportOptions,
    },
    Info {
        files: Vec<PathBuf>,
    },
    Bounds {
        files: Vec<PathBuf>,
        each: bool,
    },
    DisposeDemo {
        file: PathBuf,
    },
}

fn parse_switch(arg: &str, name: &str) -> Option<bool> {
    // --name[=on|off]
    let rest = arg.strip_prefix("--")?.strip_prefix(name)?;
    if rest.is_empty() {
        return Some(true);
    }
    let val = rest.strip_prefix('=')?;
    Some(matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    ))
}

fn parse_categories(list: &str) -> Result<Vec<CategoryId>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<CategoryId>()
                .with_context(|| format!("Invalid category '{s}' in --exclude"))
        })
        .collect()
}

pub fn parse_args<I, S>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let args: Vec<String> = args.into_iter().map(Into::into).collect();
    let Some((command, rest)) = args.split_first() else {
        bail!("missing command\n{USAGE}");
    };

    let mut files: Vec<PathBuf> = Vec::new();
    let mut out: Option<PathBuf> = None;
    let mut settings = ConversionSettings::default();
    let mut export = ExportOptions::default();
    let mut each = false;

    for arg in rest {
        if let Some(v) = arg.strip_prefix("--out=") {
            out = Some(PathBuf::from(v));
        } else if let Some(v) = arg.strip_prefix("--exclude=") {
            settings = settings.excluding(parse_categories(v)?);
        } else if let Some(on) = parse_switch(arg, "coordinate-to-origin") {
            settings.coordinate_to_origin = on;
        } else if let Some(on) = parse_switch(arg, "compress") {
            export.compress = on;
        } else if let Some(on) = parse_switch(arg, "each") {
            each = on;
        } else if arg.starts_with("--") {
            log::warn!("Unknown flag '{arg}' ignored");
        } else {
            files.push(PathBuf::from(arg));
        }
    }

    match command.as_str() {
        "convert" => {
            let [input] = <[PathBuf; 1]>::try_from(files)
                .map_err(|_| anyhow::anyhow!("convert takes exactly one input\n{USAGE}"))?;
            let output = out.unwrap_or_else(|| input.with_extension(fragments::FILE_EXTENSION));
            Ok(Command::Convert {
                input,
                output,
                settings,
                export,
            })
        }
        "info" | "bounds" if files.is_empty() => bail!("{command} needs at least one file\n{USAGE}"),
        "info" => Ok(Command::Info { files }),
        "bounds" => Ok(Command::Bounds { files, each }),
        "dispose-demo" => {
            let [file] = <[PathBuf; 1]>::try_from(files)
                .map_err(|_| anyhow::anyhow!("dispose-demo takes exactly one file\n{USAGE}"))?;
            Ok(Command::DisposeDemo { file })
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}
