//! Entry point for fragtool.
//! Converts OBJ models into `.frag` files and inspects them.

mod cli;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use cli::Command;
use fragments::{
    BoundingBoxer, ConversionSettings, Converter, ExportOptions, FragmentsManager, GroupId,
    SharedPool, obj,
};

fn run_convert(
    input: &Path,
    output: &Path,
    settings: ConversionSettings,
    export: ExportOptions,
) -> Result<()> {
    let model = obj::load_obj_from_path(input)?;
    let name = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_owned());

    let pool = SharedPool::new();
    let group = Converter::new(settings)
        .convert(&pool, &name, model.entities, Some(model.properties))
        .with_context(|| format!("Failed to convert {}", input.display()))?;

    let bytes = group.export_with(&export)?;
    fs::write(output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "{} -> {} ({} bytes, {} fragments, {} instances, {} shapes)",
        input.display(),
        output.display(),
        bytes.len(),
        group.fragment_count()?,
        group.instance_count()?,
        pool.len()
    );

    if let Some(properties) = group.get_local_properties()? {
        if !properties.is_empty() {
            let json_path = output.with_extension("json");
            let json = properties.to_json().context("Failed to serialize properties")?;
            fs::write(&json_path, json)
                .with_context(|| format!("Failed to write {}", json_path.display()))?;
            println!("properties -> {}", json_path.display());
        }
    }
    Ok(())
}

fn load_all(manager: &mut FragmentsManager, files: &[PathBuf]) -> Result<Vec<GroupId>> {
    files
        .iter()
        .map(|file| {
            let bytes =
                fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            manager
                .load(&bytes)
                .with_context(|| format!("Failed to load {}", file.display()))
        })
        .collect()
}

fn run_info(files: &[PathBuf]) -> Result<()> {
    let mut manager = FragmentsManager::new();
    manager.on_fragments_loaded(|id, group| {
        log::info!("Loaded {id} '{}'", group.name()?);
        Ok(())
    });
    let ids = load_all(&mut manager, files)?;

    for (file, id) in files.iter().zip(ids) {
        let Some(group) = manager.group(id) else {
            continue;
        };
        let entities = group
            .get_local_properties()?
            .map_or(0, |properties| properties.len());
        println!("{} ({id})", file.display());
        println!("  name:       {}", group.name()?);
        println!("  fragments:  {}", group.fragment_count()?);
        println!("  instances:  {}", group.instance_count()?);
        println!("  properties: {entities} entities");
        match group.compute_world_aabb()? {
            Some(aabb) => println!("  bounds:     {} .. {}", aabb.min, aabb.max),
            None => println!("  bounds:     (empty)"),
        }
    }
    let pool = manager.pool();
    println!(
        "pool: {} shapes, {} buffer bytes",
        pool.len(),
        pool.buffer_bytes()
    );
    Ok(())
}

fn print_box(label: &str, boxer: &BoundingBoxer) {
    let Ok(aabb) = boxer.try_box() else {
        println!("{label}: (empty)");
        return;
    };
    println!("{label}:");
    println!("  min:    {}", aabb.min);
    println!("  max:    {}", aabb.max);
    println!("  center: {}", aabb.center());
    println!("  size:   {}", aabb.size());
    if let Some(mesh) = boxer.get_mesh() {
        for (i, corner) in mesh.vertices.iter().enumerate() {
            println!("  corner {i}: {corner}");
        }
    }
}

fn run_bounds(files: &[PathBuf], each: bool) -> Result<()> {
    let mut manager = FragmentsManager::new();
    let ids = load_all(&mut manager, files)?;
    if let Some(&base) = ids.first() {
        manager.coordinate(base)?;
    }

    let mut boxer = BoundingBoxer::new();
    for (file, id) in files.iter().zip(&ids) {
        if each {
            boxer.reset();
        }
        if let Some(group) = manager.group(*id) {
            boxer.add(group)?;
        }
        if each {
            print_box(&file.display().to_string(), &boxer);
        }
    }
    if !each {
        print_box(&format!("{} models", ids.len()), &boxer);
    }
    Ok(())
}

fn run_dispose_demo(file: &Path) -> Result<()> {
    let mut manager = FragmentsManager::new();
    load_all(&mut manager, &[file.to_path_buf()])?;
    println!(
        "loaded:   {} models, {} shapes, {} buffer bytes",
        manager.len(),
        manager.pool().len(),
        manager.pool().buffer_bytes()
    );
    manager.dispose();
    println!(
        "disposed: {} models, {} shapes, {} buffer bytes",
        manager.len(),
        manager.pool().len(),
        manager.pool().buffer_bytes()
    );
    manager.dispose();
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = cli::parse_args(std::env::args().skip(1))?;
    log::debug!("Running {command:?}");

    match command {
        Command::Convert {
            input,
            output,
            settings,
            export,
        } => run_convert(&input, &output, settings, export),
        Command::Info { files } => run_info(&files),
        Command::Bounds { files, each } => run_bounds(&files, each),
        Command::DisposeDemo { file } => run_dispose_demo(&file),
    }
}
