//! 动作文件检查工具
//!
//! 解析 BVH / VMD 并打印重定向前的摘要，用于排查映射表与文件问题。

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use mocap_retarget::library::{MotionRequest, MotionSource};
use mocap_retarget::{get_config, set_config, BoneMapSet, MotionLibrary, VmdFile};

#[derive(Parser)]
#[command(name = "inspect")]
#[command(author, version, about = "Inspect BVH / VMD motion files", long_about = None)]
struct Cli {
    /// 日志级别 (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// 自定义映射表 JSON
    #[arg(long, global = true)]
    maps: Option<PathBuf>,

    /// 输出 JSON
    #[arg(long, global = true)]
    json: bool,

    /// 覆盖源动作帧率
    #[arg(long, global = true)]
    source_fps: Option<f32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a motion file after canonicalisation
    Info(InfoArgs),

    /// Show raw VMD section counts
    Vmd(VmdArgs),

    /// List bone-map tables
    Maps,
}

#[derive(Args)]
struct InfoArgs {
    file: PathBuf,

    /// VMD 使用的映射表
    #[arg(long, default_value = "Vocaloid")]
    vmd_map: String,
}

#[derive(Args)]
struct VmdArgs {
    file: PathBuf,
}

#[derive(Serialize)]
struct MotionSummary {
    name: String,
    kind: String,
    duration: f32,
    hip_height: f32,
    tracks: Vec<String>,
    morph_tracks: usize,
    camera_tracks: usize,
    ik_switches: Vec<(String, Option<bool>)>,
    warnings: Vec<String>,
}

#[derive(Serialize)]
struct VmdSummary {
    model: String,
    new_format: bool,
    bones: usize,
    morphs: usize,
    cameras: usize,
    lights: Option<usize>,
    shadows: Option<usize>,
    ik_records: Option<usize>,
    last_frame: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> mocap_retarget::Result<()> {
    if let Some(fps) = cli.source_fps.filter(|fps| *fps > 0.0) {
        let mut config = get_config();
        config.source_fps = fps;
        set_config(config);
    }

    let maps = match &cli.maps {
        Some(path) => BoneMapSet::load(path)?,
        None => BoneMapSet::builtin()?,
    };

    match &cli.command {
        Commands::Info(args) => {
            let name = args
                .file
                .file_stem()
                .map_or_else(|| "motion".to_string(), |s| s.to_string_lossy().into_owned());
            let mut library = MotionLibrary::new(maps, get_config()).with_vmd_map(&args.vmd_map);
            let motion = library.load(MotionRequest::new(name, MotionSource::File(args.file.clone())))?;

            let summary = MotionSummary {
                name: motion.name.clone(),
                kind: format!("{:?}", motion.kind),
                duration: motion.duration(),
                hip_height: motion.hip_height,
                tracks: motion.clip.track_names(),
                morph_tracks: motion.morphs.as_ref().map_or(0, |c| c.tracks.len()),
                camera_tracks: motion.camera.as_ref().map_or(0, |c| c.tracks.len()),
                ik_switches: motion
                    .ik_switches
                    .iter()
                    .map(|s| (s.name.clone(), s.enabled_at_start()))
                    .collect(),
                warnings: motion.warnings.iter().map(ToString::to_string).collect(),
            };
            if cli.json {
                print_json(&summary);
            } else {
                println!("{} ({}), {:.2}s, hip height {:.3}", summary.name, summary.kind, summary.duration, summary.hip_height);
                println!("  {} bone tracks, {} morph tracks, {} camera tracks", summary.tracks.len(), summary.morph_tracks, summary.camera_tracks);
                for track in &summary.tracks {
                    println!("    {}", track);
                }
                for (name, enabled) in &summary.ik_switches {
                    println!("  IK {}: {:?}", name, enabled);
                }
                for warning in &summary.warnings {
                    println!("  warning: {}", warning);
                }
            }
        }
        Commands::Vmd(args) => {
            let vmd = VmdFile::load(&args.file)?;
            let counts = vmd.counts();
            let summary = VmdSummary {
                model: vmd.header.model_name.clone(),
                new_format: vmd.header.new_format,
                bones: counts.bones,
                morphs: counts.morphs,
                cameras: counts.cameras,
                lights: counts.lights,
                shadows: counts.shadows,
                ik_records: counts.ik_states.as_ref().map(Vec::len),
                last_frame: vmd.max_frame(),
            };
            if cli.json {
                print_json(&summary);
            } else {
                println!("model '{}' ({})", summary.model, if summary.new_format { "new" } else { "old" });
                println!("  bones {} / morphs {} / cameras {}", summary.bones, summary.morphs, summary.cameras);
                println!(
                    "  lights {:?} / shadows {:?} / ik {:?}",
                    summary.lights, summary.shadows, summary.ik_records
                );
                println!("  last frame {}", summary.last_frame);
            }
        }
        Commands::Maps => {
            for table in &maps.maps {
                println!(
                    "{}: {} bones, {} morphs, adjust {:?}",
                    table.name,
                    table.bones.len(),
                    table.morphs.len(),
                    table.adjust
                );
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => log::error!("JSON output failed: {}", e),
    }
}
