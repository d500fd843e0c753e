use crate::entry::{Entry, Location};

/// How a match is rendered as one line of the result list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchFormat {
    /// name, kind, path tail, location and extra in fixed columns
    #[default]
    Columns,
    /// `name  file:location`
    Compact,
    Name,
}

fn tail(s: &str, max_chars: usize) -> &str {
    let count = s.chars().count();
    if count <= max_chars {
        return s;
    }
    match s.char_indices().nth(count - max_chars) {
        Some((start, _)) => &s[start..],
        None => s,
    }
}

fn head(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((end, _)) => &s[..end],
        None => s,
    }
}

impl MatchFormat {
    /// Unknown names fall back to the default format
    pub fn from_name(name: &str) -> Self {
        match name {
            "columns" => MatchFormat::Columns,
            "compact" => MatchFormat::Compact,
            "name" => MatchFormat::Name,
            _ => MatchFormat::default(),
        }
    }

    pub fn format(&self, entry: &Entry) -> String {
        let location = entry.location_string();

        match self {
            MatchFormat::Columns => {
                let location = if location.is_empty() {
                    String::new()
                } else {
                    format!(":{}", head(&location, 20))
                };
                format!(
                    "{:35} {:15} {:>30}{:20} {}",
                    entry.name,
                    entry.kind,
                    tail(&entry.file, 50),
                    location,
                    entry.extra()
                )
            }
            MatchFormat::Compact if location.is_empty() => {
                format!("{}  {}", entry.name, entry.file)
            }
            MatchFormat::Compact => format!("{}  {}:{}", entry.name, entry.file, location),
            MatchFormat::Name => entry.name.clone(),
        }
    }
}

/// Editor command that opens `entry`, e.g. `edit +12 src/main.c`. Anchors become a
/// nomagic search where only `^`, `$`, `/` and `\` are special.
pub fn open_command(command: &str, entry: &Entry) -> String {
    let jump = match &entry.location {
        None => String::new(),
        Some(Location::Line(line)) => format!("+{line}"),
        Some(Location::Anchor { body, .. }) => {
            let search = format!("\\M{body}")
                .replace('\t', "\\t")
                .replace('\\', "\\\\")
                .replace('/', "\\/")
                .replace(' ', "\\ ");
            format!("+/{search}/")
        }
    };

    if jump.is_empty() {
        format!("{command} {}", entry.file)
    } else {
        format!("{command} {jump} {}", entry.file)
    }
}
