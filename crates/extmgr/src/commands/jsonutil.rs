//! Offline catalog authoring: turning release files into sidecar json,
//! merging sidecars into one array, and inspecting them.

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use extmgr_catalog::sidecar;
use extmgr_core::release;
use extmgr_core::types::ExtensionMetadata;
use serde_json::{Map, Value};
use std::process::ExitCode;

use crate::cli::{CreateJsonArgs, DumpJsonArgs, MergeJsonArgs};

/// Build a `{image_name, sysext: {...}}` sidecar from a release file.
pub fn create_json(args: &CreateJsonArgs) -> Result<ExitCode> {
    let content = std::fs::read_to_string(&args.input)
        .with_context(|| format!("couldn't read input file {}", args.input))?;
    let values = release::parse(&content, args.input.as_str())?;
    if values.is_empty() {
        bail!("{}: no entries found", args.input);
    }

    let mut sysext = Map::new();
    for (key, value) in values {
        sysext.insert(key, Value::String(value));
    }

    let mut root = Map::new();
    if let Some(name) = &args.name {
        root.insert("image_name".into(), Value::String(name.clone()));
    }
    root.insert("sysext".into(), Value::Object(sysext));

    write_json(args.output.as_deref(), &Value::Object(root))?;
    Ok(ExitCode::SUCCESS)
}

/// Concatenate several sidecar files into one json array.
pub fn merge_json(args: &MergeJsonArgs) -> Result<ExitCode> {
    let mut merged = Vec::new();
    for input in &args.inputs {
        let bytes =
            std::fs::read(input).with_context(|| format!("couldn't read input file {input}"))?;
        let value: Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("failed to parse json file {input}"))?;
        merged.push(value);
    }

    write_json(args.output.as_deref(), &Value::Array(merged))?;
    Ok(ExitCode::SUCCESS)
}

/// Parse sidecar files and print the records they hold.
pub fn dump_json(args: &DumpJsonArgs) -> Result<ExitCode> {
    for input in &args.inputs {
        let records = sidecar::load_sidecar_path(input.as_std_path())
            .with_context(|| format!("failed to parse json file {input}"))?;
        for record in &records {
            print!("{}", dump_record(record));
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn dump_record(meta: &ExtensionMetadata) -> String {
    let field = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".into());

    format!(
        "image name: {}\n\
         * sysext version_id: {}\n\
         * sysext scope: {}\n\
         * id: {}\n\
         * sysext_level: {}\n\
         * version_id: {}\n\
         * architecture: {}\n",
        field(&meta.image_name),
        field(&meta.sysext_version_id),
        field(&meta.sysext_scope),
        field(&meta.id),
        field(&meta.sysext_level),
        field(&meta.version_id),
        field(&meta.architecture),
    )
}

fn write_json(output: Option<&Utf8Path>, value: &Value) -> Result<()> {
    let mut rendered = serde_json::to_string_pretty(value)?;
    rendered.push('\n');

    match output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to create {path}"))?,
        None => print!("{rendered}"),
    }
    Ok(())
}
