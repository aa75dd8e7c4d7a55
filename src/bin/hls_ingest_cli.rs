//! Thin CLI demonstrating the facade (SPEC_FULL §11): resolves a manifest
//! URL from argv, prints variants/tracks, and reads sequential byte ranges
//! from the segment source to stdout or a sink file. Grounded on the
//! teacher's `src/bin/zap_stream_core.rs` (`clap::Parser`,
//! `pretty_env_logger::init()`, `#[tokio::main]`); this is scaffolding to
//! exercise the library, not a product surface the spec names.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use url::Url;

use hls_ingest_core::facade::HlsInput;
use hls_ingest_core::resolver::ReqwestFetchClient;
use hls_ingest_core::settings::Settings;

#[derive(Parser, Debug)]
struct Args {
    /// HLS manifest URL (master or media playlist).
    #[arg(long)]
    manifest_url: Url,

    /// Optional YAML settings file layered under `APP_`-prefixed env vars.
    #[arg(long)]
    config: Option<String>,

    /// Where to write the read-out byte stream; `-` (default) discards it.
    #[arg(long, default_value = "-")]
    out: String,

    /// How many bytes to read per `read()` call while draining the stream.
    #[arg(long, default_value_t = 64 * 1024)]
    chunk_size: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref())?;
    let client = Arc::new(ReqwestFetchClient::new());
    let input = HlsInput::new(client, args.manifest_url.clone(), settings);

    info!("resolving manifest {}", args.manifest_url);

    let variants = input.list_variants().await?;
    if variants.is_empty() {
        info!("media-only manifest (no variant list)");
    } else {
        for v in &variants {
            info!(
                "variant: bandwidth={} resolution={:?} codecs={:?} uri={}",
                v.bandwidth, v.resolution, v.codecs, v.uri
            );
        }
        if let Some(selected) = input.current_variant().await? {
            info!("selected variant: {}", selected.uri);
        }
    }

    info!("is_live={} target_duration={}s duration={:.3}s",
        input.is_live().await?,
        input.target_duration().await?,
        input.compute_duration().await?,
    );

    let source = input.segment_source().await?;
    let mut sink: Box<dyn Write> = if args.out == "-" {
        Box::new(std::io::sink())
    } else {
        Box::new(std::fs::File::create(PathBuf::from(&args.out))?)
    };

    let mut offset = 0u64;
    loop {
        let read = match source.read(offset, offset + args.chunk_size).await {
            Ok(Some((data, off))) => {
                if data.is_empty() {
                    break;
                }
                sink.write_all(&data)?;
                offset = off + data.len() as u64;
                data.len() as u64
            }
            Ok(None) => break,
            Err(e) if e.is_live_edge() => {
                error!("live edge error, stopping drain: {e}");
                break;
            }
            Err(e) => {
                error!("read failed at offset {offset}: {e}");
                break;
            }
        };
        if read == 0 {
            break;
        }
    }

    input.dispose().await;
    info!("done, drained {offset} bytes");
    Ok(())
}
