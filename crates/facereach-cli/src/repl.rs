//! REPL for the facereach interactive shell.
//!
//! Supported slash-commands:
//!   /help                              – show this list
//!   /reset                             – right arm to neutral
//!   /pose <left|right>                 – current end-effector pose
//!   /joints <left|right>               – current joint angles
//!   /preset                            – go to the configured joint preset
//!   /goto <left|right> x y z [r p y]   – cartesian move
//!   /demo                              – synthetic face through the full loop
//!   /config                            – print the active configuration
//!   /schema                            – JSON schema of the pose request
//!   /quit | /exit                      – exit

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use colored::Colorize;
use facereach_hal::sim::SimFaceDetector;
use facereach_hal::{ColorFrame, DepthFrame};
use facereach_middleware::{EventBus, Topic};
use facereach_motion::MotionServiceFacade;
use facereach_perception::CameraIntrinsics;
use facereach_runtime::{FacePipeline, ReachLoop};
use facereach_types::{ArmSide, DetectionBox, EventPayload, GoToPose, JOINT_SUFFIXES};
use tokio::sync::watch;

use crate::config::{self, Config};

/// Frames fed by `/demo` before giving up on a goal.
const DEMO_FRAMES: usize = 40;

/// Everything the commands operate on.
pub struct Session {
    pub config: Config,
    pub facade: Arc<MotionServiceFacade>,
    pub bus: EventBus,
    pub runtime: tokio::runtime::Runtime,
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Quit,
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(session: &Session, shutdown: Arc<AtomicBool>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "facereach>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        if dispatch(session, line.trim()) == Flow::Quit {
            shutdown.store(true, Ordering::SeqCst);
            break;
        }
    }
}

fn dispatch(session: &Session, line: &str) -> Flow {
    let mut words = line.split_whitespace();
    let Some(cmd) = words.next() else {
        return Flow::Continue;
    };
    let args: Vec<&str> = words.collect();

    let result = match cmd {
        "/help" => {
            cmd_help();
            Ok(())
        }
        "/reset" => cmd_reset(session),
        "/pose" => parse_side(&args).and_then(|side| cmd_pose(session, side)),
        "/joints" => parse_side(&args).map(|side| cmd_joints(session, side)),
        "/preset" => cmd_preset(session),
        "/goto" => parse_goto(&args).map(|(side, req)| cmd_goto(session, side, &req)),
        "/demo" => cmd_demo(session),
        "/config" => cmd_config(&session.config),
        "/schema" => cmd_schema(),
        "/quit" | "/exit" => {
            println!("{}", "Goodbye.".green());
            return Flow::Quit;
        }
        other => Err(format!(
            "{} '{}'. Type {} for available commands.",
            "Unknown command:".red(),
            other.yellow(),
            "/help".bold()
        )),
    };
    if let Err(msg) = result {
        println!("{msg}");
    }
    Flow::Continue
}

// ─────────────────────────────────────────────────────────────────────────────
// Argument parsing
// ─────────────────────────────────────────────────────────────────────────────

fn parse_side(args: &[&str]) -> Result<ArmSide, String> {
    let arg = args.first().ok_or_else(|| format!("{} expected left or right", "Usage:".red()))?;
    arg.parse::<ArmSide>().map_err(|e| e.to_string())
}

/// `<side> x y z [roll pitch yaw]`, base frame.
fn parse_goto(args: &[&str]) -> Result<(ArmSide, GoToPose), String> {
    let side = parse_side(args)?;
    let values = args[1..]
        .iter()
        .map(|a| a.parse::<f64>().map_err(|_| format!("not a number: '{a}'")))
        .collect::<Result<Vec<_>, _>>()?;
    let mut req = match values.as_slice() {
        [x, y, z] | [x, y, z, _, _, _] => GoToPose::position("base", *x, *y, *z),
        _ => return Err(format!("{} /goto <left|right> x y z [roll pitch yaw]", "Usage:".red())),
    };
    if let [_, _, _, roll, pitch, yaw] = values.as_slice() {
        req.roll = *roll;
        req.pitch = *pitch;
        req.yaw = *yaw;
    }
    Ok((side, req))
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "facereach Commands".bold().underline());
    println!("  {}                           – right arm to neutral", "/reset".bold().cyan());
    println!("  {}               – current end-effector pose", "/pose <left|right>".bold().cyan());
    println!("  {}             – current joint angles", "/joints <left|right>".bold().cyan());
    println!("  {}                          – go to the joint preset", "/preset".bold().cyan());
    println!("  {} – cartesian move", "/goto <left|right> x y z [r p y]".bold().cyan());
    println!("  {}                            – synthetic face through the full loop", "/demo".bold().cyan());
    println!("  {}                          – print the active configuration", "/config".bold().cyan());
    println!("  {}                          – JSON schema of GoToPose", "/schema".bold().cyan());
    println!("  {}                    – exit the CLI", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_reset(session: &Session) -> Result<(), String> {
    session.facade.reset().map_err(|e| e.to_string())?;
    println!("  {} right arm at neutral", "✓".green().bold());
    Ok(())
}

fn cmd_pose(session: &Session, side: ArmSide) -> Result<(), String> {
    let p = session.facade.get_pose(side).map_err(|e| e.to_string())?;
    println!(
        "  {} xyz = ({:.3}, {:.3}, {:.3})  rpy = ({:.3}, {:.3}, {:.3})",
        side.to_string().bold(),
        p.x,
        p.y,
        p.z,
        p.roll,
        p.pitch,
        p.yaw
    );
    Ok(())
}

fn cmd_joints(session: &Session, side: ArmSide) {
    let joints = session.facade.get_joint_angles(side);
    for (suffix, angle) in JOINT_SUFFIXES.iter().zip(joints) {
        println!("  {}_{suffix:<3} {angle:>8.3}", side);
    }
}

fn cmd_preset(session: &Session) -> Result<(), String> {
    let reached = session.facade.go_to_joint_preset().map_err(|e| e.to_string())?;
    if reached {
        println!("  {} joint preset reached", "✓".green().bold());
    } else {
        println!("  {} joint preset not reached", "✗".red().bold());
    }
    Ok(())
}

fn cmd_goto(session: &Session, side: ArmSide, req: &GoToPose) {
    if session.facade.go_to_pose(side, req) {
        println!("  {} {side} arm reached ({:.3}, {:.3}, {:.3})", "✓".green().bold(), req.x, req.y, req.z);
    } else {
        println!("  {} {side} arm did not reach the target", "✗".red().bold());
    }
}

/// Feed a stationary synthetic face through `FacePipeline` and let
/// `ReachLoop` act on the first goal.
fn cmd_demo(session: &Session) -> Result<(), String> {
    let cfg = &session.config;
    let bus = session.bus.clone();
    let facade = Arc::clone(&session.facade);

    session.runtime.block_on(async move {
        let mut results = bus.subscribe_to(Topic::MotionResults);
        let (stop_tx, stop_rx) = watch::channel(false);
        let reach = tokio::spawn(ReachLoop::new(facade, bus.clone(), cfg.reach_config()).run(stop_rx));

        let face = DetectionBox::new(290, 210, 60, 90);
        let mut pipeline = FacePipeline::new(SimFaceDetector::stationary(face), cfg.pipeline_config(), bus.clone());
        pipeline.on_control_state("demo");
        pipeline.on_camera_info(CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0));

        let mut goal = None;
        for frame in 1..=DEMO_FRAMES {
            pipeline.on_depth_frame(DepthFrame::uniform(640, 480, 1000));
            if let Some(g) = pipeline.on_color_frame(ColorFrame::filled(640, 480, 96)) {
                println!(
                    "  {} goal after {frame} frames: ({:.3}, {:.3}, {:.3})",
                    "●".cyan(),
                    g.x,
                    g.y,
                    g.z
                );
                goal = Some(g);
                break;
            }
        }

        let outcome = if goal.is_none() {
            Err(format!("{} no goal after {DEMO_FRAMES} frames", "✗".red().bold()))
        } else {
            match tokio::time::timeout(Duration::from_secs(10), results.recv()).await {
                Ok(Ok(event)) => {
                    if let EventPayload::MotionResult {
                        side,
                        success,
                        fraction,
                    } = event.payload
                    {
                        let mark = if success { "✓".green().bold() } else { "✗".red().bold() };
                        println!("  {mark} {side} arm reach finished (fraction {fraction:.2})");
                    }
                    Ok(())
                }
                Ok(Err(e)) => Err(format!("{}: {e}", "Result channel".red())),
                Err(_) => Err(format!("{} reach did not finish in time", "✗".red().bold())),
            }
        };

        let _ = stop_tx.send(true);
        if let Ok(stats) = reach.await {
            println!(
                "  reaches: {} attempted, {} succeeded, {} dropped",
                stats.attempted, stats.succeeded, stats.dropped
            );
        }
        outcome
    })
}

fn cmd_config(cfg: &Config) -> Result<(), String> {
    let raw = toml::to_string_pretty(cfg).map_err(|e| e.to_string())?;
    println!("{}", format!("# {}", config::config_path().display()).dimmed());
    println!("{raw}");
    Ok(())
}

fn cmd_schema() -> Result<(), String> {
    let schema = schemars::schema_for!(GoToPose);
    let raw = serde_json::to_string_pretty(&schema).map_err(|e| e.to_string())?;
    println!("{raw}");
    Ok(())
}
