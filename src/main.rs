use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use tracklabel::integration::{MotDetections, discover_sequences};
use tracklabel::labeling::{Session, SessionConfig, StreamInput, StreamView};
use tracklabel::tracker::parse_threshold;
use tracklabel::{IdentitySlot, ImageSequence, Roster, TrackerConfig, TrackerPipeline};

#[derive(Parser, Debug)]
#[command(
    name = "tracklabel",
    about = "Label tracked objects across videos and save per-identity crops"
)]
struct Args {
    /// Directory holding one sub-directory per video (MOTChallenge layout)
    #[arg(long, value_name = "DIR")]
    input: PathBuf,
    /// Dataset root; one folder per identity is created inside
    #[arg(long, value_name = "DIR")]
    output: PathBuf,
    /// Identity to label, repeat for several
    #[arg(long = "identity", value_name = "NAME", required = true)]
    identities: Vec<String>,
    #[arg(long, default_value_t = 0.2, value_parser = threshold)]
    conf_thresh: f32,
    #[arg(long, default_value_t = 0.75, value_parser = threshold)]
    iou_thresh: f32,
    #[arg(long, default_value_t = 0.5, value_parser = threshold)]
    track_high_thresh: f32,
    #[arg(long, default_value_t = 0.1, value_parser = threshold)]
    track_low_thresh: f32,
    #[arg(long, default_value_t = 0.5, value_parser = threshold)]
    new_track_thresh: f32,
    #[arg(long, default_value_t = 0.8, value_parser = threshold)]
    match_thresh: f32,
    /// Frames a lost track is remembered
    #[arg(long, default_value_t = 300)]
    track_buffer: u32,
    #[arg(long, default_value_t = 30.0)]
    frame_rate: f32,
    /// Processed frames between two review batches
    #[arg(long, default_value_t = tracklabel::labeling::SAMPLE_INTERVAL)]
    sample_interval: u64,
    /// Image format of saved crops
    #[arg(long, default_value = "png")]
    image_ext: String,
}

fn threshold(text: &str) -> tracklabel::Result<f32> {
    parse_threshold("threshold", text)
}

impl Args {
    fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            conf_thresh: self.conf_thresh,
            iou_thresh: self.iou_thresh,
            track_high_thresh: self.track_high_thresh,
            track_low_thresh: self.track_low_thresh,
            new_track_thresh: self.new_track_thresh,
            track_buffer: self.track_buffer,
            match_thresh: self.match_thresh,
            frame_rate: self.frame_rate,
        }
    }
}

enum Command {
    Show,
    Assign {
        stream: usize,
        track: u64,
        identity: String,
    },
    Confirm,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let command = match words.as_slice() {
        [] => return Ok(None),
        ["show"] => Command::Show,
        ["confirm"] => Command::Confirm,
        ["quit"] | ["exit"] => Command::Quit,
        ["assign", stream, track, identity @ ..] if !identity.is_empty() => Command::Assign {
            stream: stream.parse().context("stream must be a number")?,
            track: track.parse().context("track must be a number")?,
            identity: identity.join(" "),
        },
        _ => bail!("commands: show | assign <stream> <track> <identity> | confirm | quit"),
    };
    Ok(Some(command))
}

fn resolve_identity(roster: &Roster, text: &str) -> Result<IdentitySlot> {
    if let Some(slot) = roster.slot_of(text) {
        return Ok(slot);
    }
    match text.parse::<usize>() {
        Ok(index) if roster.contains(IdentitySlot(index)) => Ok(IdentitySlot(index)),
        _ => bail!("unknown identity {text:?}"),
    }
}

fn print_view(out: &mut impl Write, view: &StreamView) -> io::Result<()> {
    match view.frame_index {
        Some(frame) => writeln!(out, "[{}] {} frame {}", view.stream, view.name, frame)?,
        None => writeln!(out, "[{}] {} {:?}", view.stream, view.name, view.phase)?,
    }
    for b in &view.boxes {
        let [r, g, bl] = b.color.0;
        writeln!(
            out,
            "    track {:>4} -> {:<12} #{:02x}{:02x}{:02x}  ({:.0}, {:.0}, {:.0}x{:.0})  trail {}",
            b.track_id,
            b.label,
            r,
            g,
            bl,
            b.bbox.x,
            b.bbox.y,
            b.bbox.width,
            b.bbox.height,
            b.trail.len()
        )?;
    }
    Ok(())
}

fn open_streams(input: &Path, config: &TrackerConfig) -> Result<Vec<StreamInput>> {
    let sequences = discover_sequences(input)
        .with_context(|| format!("reading input directory {}", input.display()))?;
    if sequences.is_empty() {
        bail!("no videos found under {}", input.display());
    }
    sequences
        .into_iter()
        .map(|seq| {
            let frames = ImageSequence::open(&seq.frames_dir)?;
            let detections = MotDetections::load(&seq.detections)
                .with_context(|| format!("loading {}", seq.detections.display()))?;
            log::info!(
                "{}: {} frames, detections for {} frames",
                seq.name,
                frames.len(),
                detections.frame_count()
            );
            let pipeline = TrackerPipeline::new(detections, config.clone());
            Ok(StreamInput::new(seq.name, frames, pipeline))
        })
        .collect()
}

fn review(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut out = io::stdout();

    while !session.is_complete() {
        if !session.wait_ready(Duration::from_secs(1)) {
            log::debug!("waiting for every stream to reach its next batch");
            continue;
        }
        if session.is_complete() {
            break;
        }
        for view in session.review_state() {
            print_view(&mut out, &view)?;
        }
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = lines.next().transpose()? else {
            session.cancel();
            break;
        };
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                writeln!(out, "{err:#}")?;
                continue;
            }
        };
        match command {
            Command::Show => {}
            Command::Assign {
                stream,
                track,
                identity,
            } => {
                let result = resolve_identity(session.roster(), &identity)
                    .and_then(|slot| Ok(session.select_identity(stream, track, slot)?));
                if let Err(err) = result {
                    writeln!(out, "{err:#}")?;
                }
            }
            Command::Confirm => match session.confirm() {
                Ok(report) => writeln!(
                    out,
                    "saved {} crops, {} unlabeled",
                    report.saved.len(),
                    report.skipped
                )?,
                Err(err) => writeln!(out, "{err}")?,
            },
            Command::Quit => {
                session.cancel();
                break;
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut roster = Roster::new();
    for name in &args.identities {
        roster
            .declare(name)
            .with_context(|| format!("declaring identity {name:?}"))?;
    }

    let tracker = args.tracker_config();
    let streams = open_streams(&args.input, &tracker)?;

    let mut config = SessionConfig::new(&args.output, roster);
    config.tracker = tracker;
    config.sample_interval = args.sample_interval;
    config.image_ext = args.image_ext.clone();

    let mut session = Session::start(config, streams).context("starting labeling session")?;
    review(&mut session)?;

    let running = session.shutdown(tracklabel::labeling::JOIN_TIMEOUT);
    for summary in session.summaries() {
        if let Some(err) = &summary.error {
            log::warn!("a stream ended early: {}", err);
        }
    }
    if running > 0 {
        log::warn!("{} tracking threads did not stop in time", running);
    }
    log::info!("dataset written to {}", args.output.display());
    Ok(())
}
