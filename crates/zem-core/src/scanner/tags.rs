use super::Scanner;
use crate::config::{KindMap, TagsSource};
use crate::entry::{Entry, Location};
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

const DEFAULT_TAGS_COMMAND: &str = "!ctags -o - --recurse --sort=no";
const TAG_FILE_NAMES: [&str; 2] = [".tags", "tags"];

fn failure(message: impl Into<String>) -> Error {
    Error::Scanner {
        source_name: "tags".to_string(),
        message: message.into(),
    }
}

/// Symbols from a ctags-format tags file, or from the output of a command
/// producing one.
#[derive(Debug, Clone)]
pub struct TagsScanner {
    config: TagsSource,
}

impl TagsScanner {
    pub fn new(config: TagsSource) -> Result<Self> {
        if let (Some(command), Some(file)) = (&config.command, &config.file)
            && file.starts_with('!')
        {
            return Err(failure(format!(
                "both command `{command}` and command file `{file}` are set"
            )));
        }
        Ok(Self { config })
    }

    /// The configured file, else the last existing default tags file, else ctags
    fn tags_source(&self, root: &Path) -> String {
        if let Some(file) = &self.config.file {
            return file.clone();
        }

        TAG_FILE_NAMES
            .iter()
            .rev()
            .find(|name| root.join(name).is_file())
            .map(|name| name.to_string())
            .unwrap_or_else(|| DEFAULT_TAGS_COMMAND.to_string())
    }
}

impl Scanner for TagsScanner {
    fn name(&self) -> &str {
        "tags"
    }

    fn scan(&self, root: &Path) -> Result<Vec<Entry>> {
        let started = std::time::Instant::now();

        if let Some(command) = &self.config.command {
            let output = run_shell(root, command)?;
            info!(command = %command, took = ?started.elapsed(), output = %output.trim(), "Tags command finished");
        }

        let source = self.tags_source(root);
        let (text, from_command) = match source.strip_prefix('!') {
            Some(command) => (run_shell(root, command)?, true),
            None => {
                info!(file = %source, "Parsing tags file");
                let bytes = fs::read(root.join(&source))
                    .map_err(|e| failure(format!("cannot read {source}: {e}")))?;
                (String::from_utf8_lossy(&bytes).into_owned(), false)
            }
        };

        let entries = parse_tags(&text, self.config.priority, &self.config.kind_map)?;
        if from_command && entries.is_empty() {
            warn!(command = %source, "No tags produced by command");
        }

        debug!(count = entries.len(), took = ?started.elapsed(), "Parsed tags");
        Ok(entries)
    }
}

/// Run `command` through the platform shell inside `root` and return its stdout
fn run_shell(root: &Path, command: &str) -> Result<String> {
    info!(command, "Running tags command");

    let mut shell = if cfg!(windows) {
        let mut shell = Command::new("cmd");
        shell.args(["/C", command]);
        shell
    } else {
        let mut shell = Command::new("sh");
        shell.args(["-c", command]);
        shell
    };

    let output = shell
        .current_dir(root)
        .output()
        .map_err(|e| failure(format!("cannot run `{command}`: {e}")))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !output.status.success() {
        return Err(failure(format!(
            "`{command}` exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    if !stderr.trim().is_empty() {
        warn!(command, stderr = %stderr.trim(), "Tags command printed to stderr");
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse ctags output: `name<TAB>file<TAB>location;"<TAB>fields...`.
///
/// Lines starting with `!` are metadata. A field without a colon (or `kind:`)
/// is the kind letter, other non-empty `key:value` fields end up in the extra
/// text. A malformed location fails the whole source.
pub fn parse_tags(text: &str, priority: i64, kind_map: &KindMap) -> Result<Vec<Entry>> {
    let mut entries = Vec::new();

    for (index, line) in text.lines().enumerate() {
        if line.starts_with('!') {
            continue;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (name, rest) = line.split_once('\t').unwrap_or((line, ""));
        let (file, rest) = rest.split_once('\t').unwrap_or((rest, ""));
        // the location pattern itself may contain tabs
        let (location, fields) = match rest.rsplit_once(";\"\t") {
            Some((location, fields)) => (location, fields),
            None => (rest.strip_suffix(";\"").unwrap_or(rest), ""),
        };

        let file = file.replace('\\', "/");
        let file = file.strip_prefix("./").unwrap_or(&file);
        if name.is_empty() || file.is_empty() {
            debug!(line = index + 1, "Skipping tag without name or file");
            continue;
        }

        let location = Location::parse(location)
            .map_err(|e| failure(format!("line {}: {e}", index + 1)))?;

        let mut kind = "";
        let mut extra: Vec<&str> = Vec::new();
        for field in fields.split('\t').filter(|f| !f.is_empty()) {
            match field.split_once(':') {
                None => kind = field,
                Some(("kind", value)) => kind = value,
                Some((_, value)) if !value.is_empty() => extra.push(field),
                Some(_) => {}
            }
        }

        let (kind, subpriority) = resolve_kind(file_extension(file), kind, kind_map);
        entries.push(Entry {
            name: name.to_string(),
            kind,
            file: file.to_string(),
            extra: (!extra.is_empty()).then(|| extra.join(" ")),
            location,
            priority,
            subpriority,
        });
    }

    Ok(entries)
}

/// Text after the last dot, then after the last slash. Extension-less files
/// yield their file name.
fn file_extension(file: &str) -> &str {
    let ext = file.rsplit('.').next().unwrap_or(file);
    ext.rsplit('/').next().unwrap_or(ext)
}

fn resolve_kind(ext: &str, kind: &str, kind_map: &KindMap) -> (String, i64) {
    let configured = kind_map
        .get(ext)
        .and_then(|rules| rules.get(kind))
        .or_else(|| kind_map.get("default").and_then(|rules| rules.get(kind)));
    if let Some(rule) = configured {
        return (rule.0.clone(), rule.1);
    }

    builtin_kind(ext, kind)
        .or_else(|| builtin_kind("default", kind))
        .map(|(name, subpriority)| (name.to_string(), subpriority))
        .unwrap_or_else(|| (format!("X-{ext}-{kind}"), 5))
}

// ctags --list-kinds
fn builtin_kind(ext: &str, kind: &str) -> Option<(&'static str, i64)> {
    let rule = match ext {
        "h" | "c" => match kind {
            "I" => ("UseFile", 45),
            "c" => ("TypeClass", 90),
            "d" => ("Define", 75),
            "e" => ("DefEnum", 75),
            "g" => ("TypeEnum", 75),
            "f" => ("ImpFunc", 85),
            "l" => ("ImpVarLoc", 60),
            "m" => ("ImpMember", 80),
            "n" => ("NameSpace", 70),
            "p" => ("ProtoFunc", 70),
            "s" => ("TypeStruct", 75),
            "t" => ("TypeDef", 80),
            "u" => ("TypeUnion", 75),
            "v" => ("ImpVar", 85),
            "x" => ("ProtoVar", 70),
            _ => return None,
        },
        "py" => match kind {
            "c" => ("TypeClass", 90),
            "f" => ("ImpFunction", 85),
            "i" => ("UseFile", 45),
            "k" => ("ImpFuncLoc", 60),
            "m" => ("ImpMember", 80),
            "v" => ("ImpVar", 85),
            _ => return None,
        },
        "s" | "asm" => match kind {
            "d" => ("Define", 75),
            "l" => ("ImpLabel", 85),
            "m" => ("Define", 80),
            "t" => ("TypeDef", 80),
            _ => return None,
        },
        "txt" => match kind {
            "t" => ("Target", 90),
            "v" => ("Variable", 50),
            "f" => ("Function", 50),
            "D" => ("Option", 60),
            _ => return None,
        },
        "default" => match kind {
            "c" => ("TypeClass", 90),
            "f" => ("ImpFunction", 85),
            "v" => ("ImpVar", 85),
            "F" => ("File", 50),
            _ => return None,
        },
        _ => return None,
    };
    Some(rule)
}
