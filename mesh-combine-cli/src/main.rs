//! Mesh Combine CLI
//!
//! Command-line interface for searching scenes and combining their meshes.

mod generate;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mesh_combine_studio::session::{CombineReport, CombineSession, SearchReport};
use mesh_combine_studio::{MeshCombinerSettings, Scene};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mesh-combine")]
#[command(about = "Combine scene meshes by cell and renderer settings")]
#[command(version)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search a scene and report what would be combined
    Search {
        /// Scene YAML file
        #[arg(short, long)]
        scene: PathBuf,

        /// Combiner settings YAML file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// List every cell with its group count
        #[arg(long)]
        cells: bool,
    },

    /// Combine a scene
    Combine {
        /// Scene YAML file
        #[arg(short, long)]
        scene: PathBuf,

        /// Combiner settings YAML file
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Directory for the combined meshes as OBJ files
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the scene with the source renderers switched off
        #[arg(long)]
        save_scene: Option<PathBuf>,

        /// Print the full report as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Print or write the default settings
    Settings {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a random demo scene
    Generate {
        /// Number of objects
        #[arg(short, long, default_value_t = 100)]
        count: usize,

        /// Width of the square the objects are scattered over
        #[arg(long, default_value_t = 40.0)]
        size: f32,

        /// Random seed
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Output scene file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Search {
            scene,
            settings,
            cells,
        } => search_command(&scene, settings.as_deref(), cells),
        Commands::Combine {
            scene,
            settings,
            output,
            save_scene,
            yaml,
        } => combine_command(
            &scene,
            settings.as_deref(),
            output.as_deref(),
            save_scene.as_deref(),
            yaml,
        ),
        Commands::Settings { output } => settings_command(output.as_deref()),
        Commands::Generate {
            count,
            size,
            seed,
            output,
        } => generate_command(count, size, seed, &output),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn open_session(scene: &Path, settings: Option<&Path>) -> Result<CombineSession> {
    CombineSession::open(scene, settings)
        .with_context(|| format!("Failed to open scene {}", scene.display()))
}

fn search_command(scene: &Path, settings: Option<&Path>, list_cells: bool) -> Result<()> {
    let mut session = open_session(scene, settings)?;
    let report = session.search();
    print_search(&report);

    if list_cells {
        let index = session.combiner().cell_index();
        println!("Cells:");
        for cell in index.cells() {
            println!(
                "  ({}, {}, {}): {} groups",
                cell.x,
                cell.y,
                cell.z,
                index.groups_in_cell(cell)
            );
        }
    }
    Ok(())
}

fn print_search(report: &SearchReport) {
    println!("Found objects: {}", report.objects);
    println!("Found LOD groups: {}", report.lod_groups);
    if report.unreadable_meshes > 0 {
        println!("Unreadable meshes skipped: {}", report.unreadable_meshes);
    }
    println!("Cells: {}", report.cells);
    println!("Combine groups: {}", report.groups);

    let c = &report.conditions;
    println!("Distinct values:");
    println!("  materials: {}", c.material_count);
    println!("  lightmap indices: {}", c.lightmap_index_count);
    println!("  shadow casting modes: {}", c.shadow_casting_mode_count);
    println!("  receive shadows: {}", c.receive_shadows_count);
    println!("  receive gi: {}", c.receive_gi_count);
    println!("  light probe usages: {}", c.light_probe_usage_count);
    println!("  reflection probe usages: {}", c.reflection_probe_usage_count);
    println!("  probe anchors: {}", c.probe_anchor_count);
    println!(
        "  motion vector modes: {}",
        c.motion_vector_generation_mode_count
    );
    println!("  static flags: {}", c.static_flags_count);
    println!("  layers: {}", c.layer_count);
    println!("  combine conditions: {}", c.combine_conditions_count);

    for notice in &report.notices {
        println!("Skipped node {}: {}", notice.node.0, notice.reason);
    }
    for adjustment in &report.adjustments {
        println!("Adjusted {}: {}", adjustment.field, adjustment.message);
    }
}

fn combine_command(
    scene: &Path,
    settings: Option<&Path>,
    output: Option<&Path>,
    save_scene: Option<&Path>,
    yaml: bool,
) -> Result<()> {
    let mut session = open_session(scene, settings)?;
    let report = session.combine().context("Combine failed")?;

    if yaml {
        print!("{}", serde_yaml::to_string(&report)?);
    } else {
        print_combine(&report);
    }

    if let Some(dir) = output {
        let written = session
            .save_meshes(dir)
            .with_context(|| format!("Failed to save meshes to {}", dir.display()))?;
        println!("Saved {} meshes to {}", written.len(), dir.display());
    }
    if let Some(path) = save_scene {
        session
            .save_scene(path)
            .with_context(|| format!("Failed to save scene to {}", path.display()))?;
        println!("Saved scene to {}", path.display());
    }
    Ok(())
}

fn print_combine(report: &CombineReport) {
    let stats = &report.stats;
    println!("Jobs: {}", report.jobs);
    println!("Combined meshes: {}", report.combined_meshes);
    println!(
        "Draw calls: {} -> {} ({:.1}% fewer)",
        stats.original_draw_calls,
        stats.new_draw_calls,
        stats.draw_call_reduction() * 100.0
    );
    println!(
        "Vertices: {} -> {}",
        stats.original_vertices, stats.new_vertices
    );
    println!(
        "Triangles: {} -> {}",
        stats.original_triangles, stats.new_triangles
    );
    println!("Combine time: {:.2?}", stats.combine_duration);
    println!(
        "Workers: {} (cores: {})",
        report.status.worker_states.len(),
        report.status.cores
    );
    println!(
        "Mesh cache hit rate: {:.1}%",
        report.metrics.cache_hit_rate * 100.0
    );
    for failure in &report.failures {
        println!("Job {} ({}) failed: {}", failure.job, failure.name, failure.message);
    }
}

fn settings_command(output: Option<&Path>) -> Result<()> {
    let settings = MeshCombinerSettings::default();
    match output {
        Some(path) => {
            mesh_combine_studio::save_settings(path, &settings)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "default settings written");
        }
        None => print!("{}", serde_yaml::to_string(&settings)?),
    }
    Ok(())
}

fn generate_command(count: usize, size: f32, seed: u64, output: &Path) -> Result<()> {
    anyhow::ensure!(size > 0.0, "size must be positive, got {}", size);
    let scene: Scene = generate::generate_scene(count, size, seed);
    mesh_combine_studio::save_scene(output, &scene)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Generated {} nodes and {} meshes into {}",
        scene.nodes.len(),
        scene.meshes.len(),
        output.display()
    );
    Ok(())
}
