// src/core/logging.rs

use crate::constants::STDOUT_SINK;
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::kv::{self, Key, Source, Value, VisitSource};
use log::{Level, Record};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;

/// A logging handle with a fixed set of fields attached to every record it emits.
///
/// Cheap to clone and never mutated after construction, so it can be handed to
/// every task a service spawns.
#[derive(Debug, Clone, Default)]
pub struct ServiceLogger {
    fields: Vec<(String, String)>,
}

impl ServiceLogger {
    /// Creates a logger with no bound fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this logger with one more bound field.
    pub fn with(&self, key: impl Into<String>, value: impl Display) -> Self {
        let mut fields = self.fields.clone();
        fields.push((key.into(), value.to_string()));
        Self { fields }
    }

    /// The bound fields, in the order they were added.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn debug(&self, msg: &str, extra: &[(&str, &dyn Display)]) {
        self.log(Level::Debug, msg, extra);
    }

    pub fn info(&self, msg: &str, extra: &[(&str, &dyn Display)]) {
        self.log(Level::Info, msg, extra);
    }

    pub fn warn(&self, msg: &str, extra: &[(&str, &dyn Display)]) {
        self.log(Level::Warn, msg, extra);
    }

    pub fn error(&self, msg: &str, extra: &[(&str, &dyn Display)]) {
        self.log(Level::Error, msg, extra);
    }

    fn log(&self, level: Level, msg: &str, extra: &[(&str, &dyn Display)]) {
        if level > log::max_level() {
            return;
        }
        let pairs = Pairs {
            bound: &self.fields,
            extra,
        };
        log::logger().log(
            &Record::builder()
                .args(format_args!("{msg}"))
                .level(level)
                .target(module_path!())
                .key_values(&pairs)
                .build(),
        );
    }
}

struct Pairs<'a> {
    bound: &'a [(String, String)],
    extra: &'a [(&'a str, &'a dyn Display)],
}

impl Source for Pairs<'_> {
    fn visit<'kvs>(&'kvs self, visitor: &mut dyn VisitSource<'kvs>) -> Result<(), kv::Error> {
        for (key, value) in self.bound {
            visitor.visit_pair(Key::from_str(key), Value::from(value.as_str()))?;
        }
        for (key, value) in self.extra {
            visitor.visit_pair(Key::from_str(key), Value::from_dyn_display(*value))?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Collected(Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for Collected {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

fn collect_pairs(record: &Record<'_>) -> Vec<(String, String)> {
    let mut collected = Collected::default();
    // A failing visitor only costs us the remaining fields.
    let _ = record.key_values().visit(&mut collected);
    collected.0
}

/// Quotes a logfmt value when it would otherwise be ambiguous.
fn logfmt_value(value: &str) -> String {
    if value.is_empty() || value.contains(|c: char| c.is_whitespace() || c == '"' || c == '=') {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

fn text_line(time: &dyn Display, record: &Record<'_>) -> String {
    let mut line = format!(
        "time={} level={} msg={}",
        time,
        record.level(),
        logfmt_value(&record.args().to_string())
    );
    for (key, value) in collect_pairs(record) {
        line.push(' ');
        line.push_str(&key);
        line.push('=');
        line.push_str(&logfmt_value(&value));
    }
    line
}

fn json_line(time: &dyn Display, record: &Record<'_>) -> String {
    let mut object = serde_json::Map::new();
    object.insert("time".into(), time.to_string().into());
    object.insert("level".into(), record.level().to_string().into());
    object.insert("msg".into(), record.args().to_string().into());
    for (key, value) in collect_pairs(record) {
        object.insert(key, value.into());
    }
    serde_json::Value::Object(object).to_string()
}

/// Installs the global logger.
///
/// `output` is a file to append to, or `-` for stdout. `json` selects one JSON object
/// per line instead of logfmt-style text. The level filter comes from `RUST_LOG` and
/// defaults to `info`.
///
/// # Errors
/// Returns an error if the output file cannot be opened or a logger is already installed.
pub fn init(output: &str, json: bool) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if output == STDOUT_SINK {
        builder.target(Target::Stdout);
    } else {
        let path = shellexpand::tilde(output).into_owned();
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options
            .open(&path)
            .with_context(|| format!("failed to open output file {path:?}"))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.format(move |buf, record| {
        let time = buf.timestamp_millis();
        let line = if json {
            json_line(&time, record)
        } else {
            text_line(&time, record)
        };
        writeln!(buf, "{line}")
    });

    builder.try_init().context("failed to install logger")
}
