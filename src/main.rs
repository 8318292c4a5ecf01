//! datavis-core - Session File Inspector
//!
//! Inspects and creates session files written by the datavis-core streams.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datavis_core::{
    config::CoreConfig,
    data::{
        AttributeValue, DataCollection, DataObject, PropertyContainer, PropertyObject, VisElement,
        SOURCE_FRAME_ATTRIBUTE,
    },
    io,
    oo::{OORef, RefTarget, TargetRef},
    pipeline::{Pipeline, SetAttributeStage, StaticSource},
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "datavis-core", version, about = "Inspect datavis session files")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the stream header
    Info { file: PathBuf },
    /// List the top-level chunks
    Chunks { file: PathBuf },
    /// Load the object graph and print it as JSON
    Dump { file: PathBuf },
    /// Write a sample session file
    Demo { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config.as_ref() {
        Some(path) => CoreConfig::load(path)?,
        None => CoreConfig::default_path()
            .map(CoreConfig::load_or_default)
            .unwrap_or_default(),
    };
    let _log_guard = datavis_core::logging::init(&config.logging);

    match cli.command {
        Command::Info { file } => info(&file),
        Command::Chunks { file } => chunks(&file),
        Command::Dump { file } => dump(&file),
        Command::Demo { file } => demo(&file, &config),
    }
}

fn info(file: &Path) -> Result<()> {
    let header = io::read_header(file)
        .with_context(|| format!("Failed to read header of {}", file.display()))?;
    println!("format version: {}", header.format_version);
    println!("float width:    {} bytes", header.float_width.bytes());
    println!("product:        {}", header.product.name);
    println!(
        "version:        {}.{}.{} ({})",
        header.product.major,
        header.product.minor,
        header.product.revision,
        header.product.version_string
    );
    Ok(())
}

fn chunks(file: &Path) -> Result<()> {
    let chunks = io::list_chunks(file)
        .with_context(|| format!("Failed to list chunks of {}", file.display()))?;
    println!("{:<12} {:>10} {:>10}", "id", "offset", "length");
    for chunk in &chunks {
        println!("0x{:08X}   {:>10} {:>10}", chunk.id, chunk.offset, chunk.length);
    }
    println!("{} chunk(s)", chunks.len());
    Ok(())
}

fn dump(file: &Path) -> Result<()> {
    let root = io::load_from_file(file)
        .with_context(|| format!("Failed to load {}", file.display()))?;
    let value = match &root {
        TargetRef::Data(object) => data_object_json(object),
        TargetRef::Target(target) => json!({
            "class": target.class().name(),
            "title": target.title(),
            "data": target
                .core()
                .data_objects()
                .iter()
                .map(data_object_json)
                .collect::<Vec<_>>(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn attribute_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Bool(v) => json!(v),
        AttributeValue::Int(v) => json!(v),
        AttributeValue::Float(v) => json!(v),
        AttributeValue::String(v) => json!(v),
    }
}

fn data_object_json(object: &OORef<dyn DataObject>) -> Value {
    let mut value = json!({
        "class": object.class().name(),
        "identifier": object.identifier(),
        "title": object.title(),
        "data_references": object.data_reference_count(),
    });
    let vis: Vec<String> = object.vis_elements().iter().map(|v| v.title()).collect();
    if !vis.is_empty() {
        value["vis_elements"] = json!(vis);
    }
    if let Some(property) = object.downcast::<PropertyObject>() {
        value["components"] = json!(property.component_count());
        value["values"] = json!(property.values());
    }
    if let Some(collection) = object.downcast::<DataCollection>() {
        let attributes: serde_json::Map<String, Value> = collection
            .build_attributes_map()
            .iter()
            .map(|(key, v)| (key.clone(), attribute_json(v)))
            .collect();
        value["attributes"] = Value::Object(attributes);
    }
    let children: Vec<Value> = object.sub_objects().iter().map(data_object_json).collect();
    if !children.is_empty() {
        value["children"] = json!(children);
    }
    value
}

fn demo(file: &Path, config: &CoreConfig) -> Result<()> {
    let collection = OORef::new(DataCollection::new());
    collection.add_attribute(SOURCE_FRAME_ATTRIBUTE, 0, None);
    collection.add_attribute("Timestep", 1000, None);

    let particles = OORef::new(PropertyContainer::new("particles"));
    particles.add_property(OORef::new(PropertyObject::new(
        "Position",
        3,
        vec![0.0, 0.0, 0.0, 1.0, 0.5, 0.25, 2.0, 1.0, 0.5],
    )))?;
    particles.add_property(OORef::new(PropertyObject::new("Mass", 1, vec![1.0, 2.0, 4.0])))?;
    particles.add_vis_element(OORef::new(VisElement::new("Particles")).into_target());
    collection.add_object(particles.into_data_object());

    let source = OORef::new(StaticSource::with_data(collection));
    let mut pipeline =
        Pipeline::new(source.into_stage()).with_cache_capacity(config.pipeline.cache_capacity);
    pipeline.push_stage(
        OORef::new(SetAttributeStage::new("Label", AttributeValue::from("demo"))).into_stage(),
    );

    let state = pipeline.evaluate(0);
    anyhow::ensure!(!state.status().is_error(), "pipeline failed: {}", state.status());
    let output = state
        .data_ref()
        .context("pipeline produced no data")?
        .object()
        .clone()
        .into_data_object();

    io::save_to_file(file, &TargetRef::from(output), config.stream_header())
        .with_context(|| format!("Failed to write {}", file.display()))?;
    println!("wrote {}", file.display());
    Ok(())
}
