use bytes::Bytes;
use clap::{Parser, Subcommand};
use lifecycle_engine::config;
use lifecycle_engine::context::{Context, Details, Sender};
use lifecycle_engine::dispatch::{EventBus, Invocation, box_handler};
use lifecycle_engine::engine::Engine;
use lifecycle_engine::events::{EngineEvent, EventValue, GrayscaleOptions};
use lifecycle_engine::handlers::ImageHandlers;
use lifecycle_engine::output;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Parser)]
#[command(name = "lifecycle-engine")]
#[command(about = "Run image operations through lifecycle events")]
#[command(long_about = "\
Run image operations through lifecycle events

Every operation fires its events in order and the registered handlers do the
work. Most operations have three phases:

  before_resize → resize → after_resize

The process command applies the requested operations in a fixed order:

  read → reorientate → crop → resize → flips → grayscale → rectangle → serialize

Run 'lifecycle-engine events' to list every event name.
Run 'lifecycle-engine gen-config' to generate a documented engine.toml.")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read an image, apply operations, and write the result
    Process(ProcessArgs),
    /// List every lifecycle event, grouped by operation
    Events,
    /// Print a stock engine.toml with all options documented
    GenConfig,
}

#[derive(clap::Args)]
struct ProcessArgs {
    /// Source image
    input: PathBuf,

    /// Destination file
    #[arg(short, long)]
    output: PathBuf,

    /// Engine config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Resize to WIDTHxHEIGHT; a 0 side keeps the aspect ratio
    #[arg(long, value_parser = parse_size, conflicts_with_all = ["fit_width", "fit_height"])]
    resize: Option<(u32, u32)>,

    /// Resize to this width, height follows the aspect ratio
    #[arg(long, conflicts_with = "fit_height")]
    fit_width: Option<u32>,

    /// Resize to this height, width follows the aspect ratio
    #[arg(long)]
    fit_height: Option<u32>,

    /// Crop to LEFT,TOP,RIGHT,BOTTOM
    #[arg(long, value_parser = parse_quad, allow_hyphen_values = true)]
    crop: Option<[i32; 4]>,

    /// Mirror left to right
    #[arg(long)]
    flip_h: bool,

    /// Mirror top to bottom
    #[arg(long)]
    flip_v: bool,

    /// EXIF orientation (1-8) to apply before anything else
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=8))]
    orientation: Option<u16>,

    /// Convert to grayscale
    #[arg(long)]
    grayscale: bool,

    /// Outline LEFT,TOP,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_quad, allow_hyphen_values = true)]
    rectangle: Option<[i32; 4]>,

    /// Output format (png, jpeg, webp, ...); defaults to the config's
    #[arg(long)]
    format: Option<String>,

    /// Print every fired event in order
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Process(args) => process(args).await?,
        Command::Events => {
            for line in output::format_catalogue() {
                println!("{}", line);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

async fn process(args: ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine_config = config::load_config(args.config.as_deref())?;

    let bus = EventBus::from_config(&engine_config.dispatch);
    ImageHandlers::from_config(&engine_config)?.register(&bus)?;

    let trace = Arc::new(Mutex::new(Vec::new()));
    if args.trace {
        let seen = Arc::clone(&trace);
        bus.subscribe_many(
            EngineEvent::catalogue(),
            box_handler(move |invocation: Invocation| {
                if let Ok(mut events) = seen.lock() {
                    events.push(invocation.event);
                }
                std::future::ready(Ok(EventValue::Unit))
            }),
        )?;
    }

    let engine = Engine::new(bus);
    let sender = Sender::new("cli");

    let mut details = Details::new();
    if let Some(orientation) = args.orientation {
        details = details.with_orientation(orientation);
    }
    if let Some(name) = &args.format {
        details = details.with_format(config::parse_format(name)?);
    }
    let context = Context::new(details);

    let buffer = Bytes::from(std::fs::read(&args.input)?);
    engine.read_image(&sender, &context, buffer).await?;
    engine.reorientate(&sender, &context).await?;

    if let Some([left, top, right, bottom]) = args.crop {
        engine
            .crop(&sender, &context, left, top, right, bottom)
            .await?;
    }

    if let Some((width, height)) = args.resize {
        engine.resize(&sender, &context, width, height).await?;
    } else if let Some(width) = args.fit_width {
        let height = engine
            .get_proportional_height(&sender, &context, width)
            .await?;
        engine
            .resize(&sender, &context, width, height as u32)
            .await?;
    } else if let Some(height) = args.fit_height {
        let width = engine
            .get_proportional_width(&sender, &context, height)
            .await?;
        engine
            .resize(&sender, &context, width as u32, height)
            .await?;
    }

    if args.flip_h {
        engine.flip_horizontally(&sender, &context).await?;
    }
    if args.flip_v {
        engine.flip_vertically(&sender, &context).await?;
    }

    if args.grayscale {
        let options = GrayscaleOptions {
            update_image: true,
            ..GrayscaleOptions::default()
        };
        engine
            .convert_to_grayscale(&sender, &context, options)
            .await?;
    }

    if let Some([left, top, width, height]) = args.rectangle {
        engine
            .draw_rectangle(&sender, &context, left, top, width, height)
            .await?;
    }

    engine.serialize(&sender, &context).await?;

    let encoded = context.lock().await.output.clone();
    let Some(encoded) = encoded else {
        return Err("serialize produced no output".into());
    };
    std::fs::write(&args.output, &encoded)?;

    let size = engine.get_image_size(&sender, &context).await?;
    println!(
        "{} → {} ({}x{}, {} bytes)",
        args.input.display(),
        args.output.display(),
        size.width,
        size.height,
        encoded.len()
    );

    if args.trace {
        let fired = trace.lock().map(|events| events.clone()).unwrap_or_default();
        for line in output::format_trace(&fired) {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Parse `WIDTHxHEIGHT`.
fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;
    let width = width
        .trim()
        .parse()
        .map_err(|e| format!("bad width {width:?}: {e}"))?;
    let height = height
        .trim()
        .parse()
        .map_err(|e| format!("bad height {height:?}: {e}"))?;
    Ok((width, height))
}

/// Parse four comma-separated integers.
fn parse_quad(value: &str) -> Result<[i32; 4], String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<i32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("bad number in {value:?}: {e}"))?;
    parts
        .try_into()
        .map_err(|parts: Vec<i32>| format!("expected 4 numbers, got {}", parts.len()))
}
