use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use vrlink_core::{DeliveryMode, Eye, PacketReader, StereoMailbox, ViewerConfig};
use vrlink_render::{DisplaySession, FrameDecoder, FrameIngest, SoftwareBackend, SoftwareSurface};

#[derive(Parser)]
#[command(
    name = "vrlink",
    version,
    about = "vrlink: stereo frame presenter tools",
    long_about = "Offline tools for the vrlink stereo viewer.\nRender JPEG eye pairs exactly as the headset would, and inspect VRHP stream captures."
)]
struct Cli {
    /// Viewer configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one stereo frame through the viewer pipeline to a PNG
    Render {
        /// Left-eye image
        #[arg(long, requires = "right", conflicts_with = "stereo")]
        left: Option<PathBuf>,

        /// Right-eye image
        #[arg(long, requires = "left")]
        right: Option<PathBuf>,

        /// One side-by-side image carrying both eyes
        #[arg(long)]
        stereo: Option<PathBuf>,

        /// Surface width (default: two eye textures wide)
        #[arg(long)]
        width: Option<u32>,

        /// Surface height (default: one eye texture high)
        #[arg(long)]
        height: Option<u32>,

        /// Output PNG path
        #[arg(short, long, default_value = "stereo.png")]
        output: PathBuf,
    },

    /// List the frames in a VRHP capture file
    Inspect {
        /// Capture file
        #[arg()]
        capture: PathBuf,

        /// Print a JSON report instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Push every frame of a VRHP capture through the viewer and save the last presented frame
    Replay {
        /// Capture file
        #[arg()]
        capture: PathBuf,

        /// Output PNG path
        #[arg(short, long, default_value = "replay.png")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render {
            left,
            right,
            stereo,
            width,
            height,
            output,
        } => {
            let input = match (left, right, stereo) {
                (Some(left), Some(right), None) => Input::PerEye { left, right },
                (None, None, Some(stereo)) => Input::SideBySide(stereo),
                _ => bail!("pass either --left and --right, or --stereo"),
            };
            cmd_render(&config, input, width, height, &output)
        }
        Commands::Inspect { capture, json } => cmd_inspect(&config, &capture, json),
        Commands::Replay { capture, output } => cmd_replay(&config, &capture, &output),
    }
}

fn load_config(path: Option<&Path>) -> Result<ViewerConfig> {
    match path {
        Some(path) => ViewerConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(ViewerConfig::default()),
    }
}

enum Input {
    PerEye { left: PathBuf, right: PathBuf },
    SideBySide(PathBuf),
}

/// Inline ingest feeding a software-rendered session.
struct OfflineViewer {
    ingest: FrameIngest,
    session: DisplaySession<SoftwareBackend>,
}

impl OfflineViewer {
    fn new(config: &ViewerConfig, width: Option<u32>, height: Option<u32>) -> Result<Self> {
        let mailbox = Arc::new(StereoMailbox::new());
        let ingest = FrameIngest::inline(config, mailbox.clone())
            .context("failed to start frame ingest")?;
        let mut session = DisplaySession::new(SoftwareBackend::new(), config, mailbox);

        let surface = SoftwareSurface {
            width: width.unwrap_or(config.textures.width * 2),
            height: height.unwrap_or(config.textures.height),
        };
        session
            .attach_surface(surface)
            .context("failed to attach the software surface")?;
        Ok(Self { ingest, session })
    }

    fn save(&self, output: &Path) -> Result<()> {
        let Some(frame) = self.session.backend().presented() else {
            bail!("no frame was presented");
        };
        frame
            .save(output)
            .with_context(|| format!("failed to write {}", output.display()))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn cmd_render(
    config: &ViewerConfig,
    input: Input,
    width: Option<u32>,
    height: Option<u32>,
    output: &Path,
) -> Result<()> {
    let start = Instant::now();
    let mut viewer = OfflineViewer::new(config, width, height)?;

    match input {
        Input::PerEye { left, right } => {
            for (eye, path) in [(Eye::Left, left), (Eye::Right, right)] {
                let bytes = read_file(&path)?;
                viewer
                    .ingest
                    .on_frame_received(eye, &bytes, bytes.len())
                    .with_context(|| format!("failed to decode {eye} eye {}", path.display()))?;
            }
        }
        Input::SideBySide(path) => {
            let bytes = read_file(&path)?;
            viewer
                .ingest
                .on_stereo_frame_received(&bytes, bytes.len())
                .with_context(|| format!("failed to decode {}", path.display()))?;
        }
    }

    viewer.session.render_frame().context("render failed")?;
    viewer.save(output)?;

    let geometry = viewer.session.geometry();
    println!(
        "Rendered {}x{} stereo frame to {} in {:.1}ms",
        geometry.width(),
        geometry.height(),
        output.display(),
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct FrameReport {
    frame_id: u32,
    payload_len: usize,
    width: Option<u32>,
    height: Option<u32>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct CaptureReport {
    capture: PathBuf,
    frames: Vec<FrameReport>,
    unreadable: usize,
    /// Error that stopped reading, if the capture is not cleanly framed.
    stream_error: Option<String>,
}

fn open_capture(config: &ViewerConfig, path: &Path) -> Result<PacketReader<BufReader<File>>> {
    let file =
        File::open(path).with_context(|| format!("failed to open capture {}", path.display()))?;
    Ok(PacketReader::new(
        BufReader::new(file),
        config.stream.max_payload_bytes,
    ))
}

fn cmd_inspect(config: &ViewerConfig, capture: &Path, json: bool) -> Result<()> {
    let mut reader = open_capture(config, capture)?;
    let mut report = CaptureReport {
        capture: capture.to_path_buf(),
        frames: Vec::new(),
        unreadable: 0,
        stream_error: None,
    };

    loop {
        match reader.next_packet() {
            Ok(Some(packet)) => {
                let probe = FrameDecoder::probe_dimensions(&packet.payload);
                if probe.is_err() {
                    report.unreadable += 1;
                }
                report.frames.push(FrameReport {
                    frame_id: packet.frame_id,
                    payload_len: packet.payload.len(),
                    width: probe.as_ref().ok().map(|d| d.0),
                    height: probe.as_ref().ok().map(|d| d.1),
                    error: probe.err().map(|e| e.to_string()),
                });
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "capture framing broken, stopping");
                report.stream_error = Some(e.to_string());
                break;
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}: {} frame(s)", capture.display(), report.frames.len());
        for frame in &report.frames {
            match (frame.width, frame.height, &frame.error) {
                (Some(w), Some(h), _) => println!(
                    "  #{:<6} {:>9} bytes  {}x{}",
                    frame.frame_id, frame.payload_len, w, h
                ),
                (_, _, Some(err)) => println!(
                    "  #{:<6} {:>9} bytes  unreadable: {}",
                    frame.frame_id, frame.payload_len, err
                ),
                _ => {}
            }
        }
        if let Some(err) = &report.stream_error {
            println!("  stream error: {err}");
        }
    }

    if report.stream_error.is_some() {
        bail!("capture {} is not cleanly framed", capture.display());
    }
    Ok(())
}

fn cmd_replay(config: &ViewerConfig, capture: &Path, output: &Path) -> Result<()> {
    let start = Instant::now();
    let mut viewer = OfflineViewer::new(config, None, None)?;
    let reader = open_capture(config, capture)?;

    let mut packets = 0usize;
    for packet in reader {
        let packet = packet.with_context(|| format!("failed to read {}", capture.display()))?;
        packets += 1;
        let payload = &packet.payload;
        // Decode failures are counted by ingest and keep the previous frame.
        let result = match config.decoder.delivery {
            DeliveryMode::SideBySide => viewer
                .ingest
                .on_stereo_frame_received(payload, payload.len()),
            DeliveryMode::PerEye => viewer
                .ingest
                .on_frame_received(Eye::Left, payload, payload.len())
                .and_then(|()| {
                    viewer
                        .ingest
                        .on_frame_received(Eye::Right, payload, payload.len())
                }),
        };
        if let Err(e) = result {
            tracing::warn!(frame_id = packet.frame_id, error = %e, "frame skipped");
        }
        viewer.session.render_frame().context("render failed")?;
    }

    if packets == 0 {
        bail!("capture {} holds no frames", capture.display());
    }
    viewer.save(output)?;

    let ingest = viewer.ingest.stats();
    let session = viewer.session.stats();
    println!(
        "Replayed {} packet(s) in {:.1}ms: {} decoded, {} failed, {} presented -> {}",
        packets,
        start.elapsed().as_secs_f64() * 1000.0,
        ingest.frames_decoded,
        ingest.decode_failures,
        session.frames_presented,
        output.display()
    );
    Ok(())
}
