use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use wav_io::header::WavHeader;

use ft8codec::constant::FT8_SAMPLE_RATE;
use ft8codec::spectrogram::render_waterfall;
use ft8codec::{Config, Decoder, Encoder, MemoryHashTable, FTX_LDPC_K_BYTES};

type DynResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "ft8codec", version, about = "FT8 message encoder and decoder")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// trace, debug, info, warn or error
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Synthesize a message into a WAV file
    Encode {
        text: String,
        /// Frequency of tone 0, Hz
        #[arg(long, default_value_t = 1500.0)]
        freq: f32,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Decode every message in a WAV file
    Decode {
        input: PathBuf,
        /// Also render the waterfall to a PNG
        #[arg(long)]
        plot: Option<PathBuf>,
    },
    /// Print the 91 packed bits of a message as hex
    Pack { text: String },
    /// Turn 24 hex digits of packed bits back into text
    Unpack { digits: String },
}

/// Initialize logging with optional level. Falls back to INFO.
fn init_logging(log_level: Option<&str>) {
    let level = log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .init();
}

fn parse_hex(digits: &str) -> DynResult<[u8; FTX_LDPC_K_BYTES]> {
    let bytes = hex::decode(digits.trim())?;
    match <[u8; FTX_LDPC_K_BYTES]>::try_from(bytes.as_slice()) {
        Ok(a91) => Ok(a91),
        Err(_) => Err(format!("expected {} bytes, got {}", FTX_LDPC_K_BYTES, bytes.len()).into()),
    }
}

fn read_wav(path: &Path) -> DynResult<(u32, Vec<f32>)> {
    let file = File::open(path)?;
    let (header, samples) =
        wav_io::read_from_file(file).map_err(|e| format!("{}: {:?}", path.display(), e))?;
    let samples = if header.channels == 2 {
        wav_io::utils::stereo_to_mono(samples)
    } else {
        samples
    };
    Ok((header.sample_rate, samples))
}

fn write_wav(path: &Path, samples: &[f32]) -> DynResult<()> {
    let mut header = WavHeader::new_mono();
    header.sample_rate = FT8_SAMPLE_RATE;
    let mut file = File::create(path)?;
    wav_io::write_to_file(&mut file, &header, &samples.to_vec())
        .map_err(|e| format!("{}: {:?}", path.display(), e))?;
    Ok(())
}

fn main() -> DynResult<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    config.validate()?;
    init_logging(cli.log_level.as_deref().or(config.log_level.as_deref()));
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path.display());
    }

    match cli.command {
        Command::Encode { text, freq, out } => {
            let samples = Encoder::new(config.encoder.clone()).encode(&text, freq)?;
            write_wav(&out, &samples)?;
            info!("wrote {} samples to {}", samples.len(), out.display());
        }
        Command::Decode { input, plot } => {
            let (sample_rate, samples) = read_wav(&input)?;
            let mut monitor = config.monitor.clone();
            monitor.sample_rate = sample_rate;

            let start = Instant::now();
            let decoder = Decoder::new(config.decoder.clone(), &monitor)?
                .with_hash_table(Arc::new(MemoryHashTable::new()));
            if let Some(png) = plot {
                let wf = decoder.waterfall(&samples)?;
                render_waterfall(&wf, &png, (1200, 800))?;
                info!("waterfall written to {}", png.display());
            }
            let messages = decoder.decode(&samples);
            info!("Elapsed = {:?}", start.elapsed());
            for msg in &messages {
                println!(
                    "{:5.2}s {:7.1}Hz {:+4.0}dB {:3} {}",
                    msg.time_sec, msg.freq_hz, msg.snr, msg.score, msg.text
                );
            }
            decoder.close();
        }
        Command::Pack { text } => {
            let a91 = ft8codec::pack(&text)?;
            println!("{}", hex::encode_upper(a91));
        }
        Command::Unpack { digits } => {
            println!("{}", ft8codec::unpack(&parse_hex(&digits)?)?);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_bits_parse_from_hex() {
        let a91 = ft8codec::pack("CQ K1ABC FN42").unwrap();
        let digits = hex::encode_upper(a91);
        assert_eq!(digits.len(), 2 * FTX_LDPC_K_BYTES);
        assert_eq!(parse_hex(&format!(" {}\n", digits.to_lowercase())).unwrap(), a91);
        assert!(parse_hex("0123").is_err());
        assert!(parse_hex("zz23456789abcdef01234567").is_err());
    }
}
