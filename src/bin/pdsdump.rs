//! Dump the contents of a PDS3 product.
//!
//! Usage:
//!   pdsdump LABEL_FILE [OBJECT ...]
//!
//! Prints the parsed label parameters, then decodes the named objects (all of
//! them when none are given) and prints a short summary of each: dimensions
//! and dtype for images, row/column layout for tables, the first lines of
//! text objects.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use pdsread::table::ArrayObject;
use pdsread::{DataObject, Product, Value};

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(label_path) = args.next().map(PathBuf::from) else {
        bail!("usage: pdsdump LABEL_FILE [OBJECT ...]");
    };
    let requested: Vec<String> = args.collect();
    let product = Product::open(&label_path)
        .with_context(|| format!("failed to open {}", label_path.display()))?;

    println!("label: {}", label_path.display());
    for (key, value) in product.label.block.iter() {
        match value {
            Value::Block(block) => println!("  {key} ({} parameters)", block.len()),
            other => println!("  {key} = {other:?}"),
        }
    }

    let names = if requested.is_empty() {
        product.objects()
    } else {
        requested
    };
    if names.is_empty() {
        println!("no data objects in this label");
        return Ok(());
    }
    for name in names {
        println!();
        match product.load(&name) {
            Ok(object) => summarize(&name, &object),
            Err(e) => println!("{name}: failed to decode: {e}"),
        }
    }
    Ok(())
}

fn summarize(name: &str, object: &DataObject) {
    match object {
        DataObject::Image(image) => {
            println!(
                "{name}: image, shape {:?}, dtype {}",
                image.data.shape(),
                image.data.dtype().name()
            );
            for (plane, data) in &image.axplanes {
                println!("  {plane}: shape {:?}", data.shape());
            }
            if image.line_prefixes.is_some() || image.line_suffixes.is_some() {
                println!("  (line prefix/suffix tables stripped)");
            }
        }
        DataObject::Table(table) => {
            println!("{name}: table, {} rows", table.n_rows());
            for column in &table.columns {
                println!("  {}", column.name);
            }
        }
        DataObject::Array(ArrayObject::Numeric(data)) => {
            println!(
                "{name}: array, shape {:?}, dtype {}",
                data.shape(),
                data.dtype().name()
            );
        }
        DataObject::Array(ArrayObject::Records(table)) => {
            println!("{name}: record array, {} records", table.n_rows());
        }
        DataObject::Text(text) => {
            println!("{name}: text, {} bytes", text.len());
            for line in text.lines().take(5) {
                println!("  {line}");
            }
        }
    }
}
