// REMI Codec CLI entry point.
//
// Thin wrapper over the library: each subcommand loads its input, runs one
// pipeline stage, and writes the result to stdout or a file.
//
// Usage:
//   remi tokens <in.mid> [--indices] [--config FILE]
//   remi compound <in.mid> [--config FILE]
//   remi render <tokens.txt> <out.mid> [--indices] [--config FILE]
//   remi correct <in.mid> <out.mid> [--chords C_M,A_m,...] [--config FILE]
//   remi generate <out.mid> [--seed N] [--notes N]
//
// Logging goes to stderr and is controlled by RUST_LOG (default: info).

use remi_codec::bins::Chord;
use remi_codec::config::CodecConfig;
use remi_codec::correct::correct_sequence;
use remi_codec::generate::{GeneratorConfig, generate_midi};
use remi_codec::midi::MidiFile;
use remi_codec::{EventSeq, RemiError, Result};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Flags that consume the following argument as their value.
const VALUE_FLAGS: &[&str] = &["--config", "--chords", "--seed", "--notes"];

const USAGE: &str = "usage:
  remi tokens <in.mid> [--indices] [--config FILE]
  remi compound <in.mid> [--config FILE]
  remi render <tokens.txt> <out.mid> [--indices] [--config FILE]
  remi correct <in.mid> <out.mid> [--chords C_M,A_m,...] [--config FILE]
  remi generate <out.mid> [--seed N] [--notes N]";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let Some(command) = args.get(1) else {
        return Err(usage());
    };
    let rest = &args[2..];
    let positional = positional_args(rest);

    match command.as_str() {
        "tokens" => {
            let [input] = positional[..] else {
                return Err(usage());
            };
            let seq = load_sequence(input, &load_config(rest)?)?;
            if has_flag(rest, "--indices") {
                let indices: Vec<String> =
                    seq.to_token_indices()?.iter().map(|i| i.to_string()).collect();
                println!("{}", indices.join(" "));
            } else {
                println!("{}", seq.to_token_strings()?.join(" "));
            }
        }
        "compound" => {
            let [input] = positional[..] else {
                return Err(usage());
            };
            let seq = load_sequence(input, &load_config(rest)?)?;
            println!("{}", serde_json::to_string(&seq.to_compound()?)?);
        }
        "render" => {
            let [input, output] = positional[..] else {
                return Err(usage());
            };
            let config = load_config(rest)?;
            let text = std::fs::read_to_string(input)?;
            let seq = if has_flag(rest, "--indices") {
                EventSeq::from_token_indices(&parse_indices(&text)?)?
            } else {
                EventSeq::from_token_str(&text)?
            };
            let midi = seq.to_midi_with(&config)?;
            midi.save(Path::new(output))?;
            info!(bars = seq.num_bars(), output, "rendered tokens to MIDI");
        }
        "correct" => {
            let [input, output] = positional[..] else {
                return Err(usage());
            };
            let config = load_config(rest)?;
            let seq = load_sequence(input, &config)?;
            let chords = match parse_flag::<String>(rest, "--chords") {
                Some(list) => Some(
                    list.split(',')
                        .map(str::parse)
                        .collect::<Result<Vec<Chord>>>()?,
                ),
                None => None,
            };
            let corrected = correct_sequence(&seq, chords.as_deref())?;
            corrected.to_midi_with(&config)?.save(Path::new(output))?;
            info!(bars = corrected.num_bars(), output, "wrote corrected MIDI");
        }
        "generate" => {
            let [output] = positional[..] else {
                return Err(usage());
            };
            let mut config = GeneratorConfig::default();
            if let Some(n) = parse_flag(rest, "--notes") {
                config.num_notes = n;
            }
            let mut rng = match parse_flag::<u64>(rest, "--seed") {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            let midi = generate_midi(&config, &mut rng)?;
            midi.save(Path::new(output))?;
            info!(notes = config.num_notes, output, "wrote random MIDI");
        }
        other => {
            return Err(RemiError::InvalidConfig(format!(
                "unknown command {other:?}\n{USAGE}"
            )));
        }
    }
    Ok(())
}

fn usage() -> RemiError {
    RemiError::InvalidConfig(USAGE.to_string())
}

fn load_config(args: &[String]) -> Result<CodecConfig> {
    match parse_flag::<String>(args, "--config") {
        Some(path) => CodecConfig::load(Path::new(&path)),
        None => Ok(CodecConfig::default()),
    }
}

fn load_sequence(path: &str, config: &CodecConfig) -> Result<EventSeq> {
    let midi = MidiFile::load(Path::new(path))?;
    info!(
        path,
        instruments = midi.instruments.len(),
        ticks_per_beat = midi.ticks_per_beat,
        "loaded MIDI"
    );
    EventSeq::from_midi_with(&midi, config)
}

fn parse_indices(text: &str) -> Result<Vec<usize>> {
    text.split_whitespace()
        .map(|s| s.parse().map_err(|_| RemiError::UnknownToken(s.to_string())))
        .collect()
}

/// Arguments that are neither flags nor flag values.
fn positional_args(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
        } else if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
        } else if !arg.starts_with("--") {
            out.push(arg.as_str());
        }
    }
    out
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
