use crate::{data, figure, model::NUM_CLASSES, predict::Predictor, report::Ranking, serve};
use clap::{CommandFactory as _, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde_json::json;
use std::path::PathBuf;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Cli {
    #[clap(subcommand)]
    subcmd: SubCmd,
}

#[derive(Debug, Clone, Default, ValueEnum)]
enum Output {
    #[default]
    Tty,
    Json,
}

#[derive(Debug, Subcommand)]
enum SubCmd {
    /// Serve predictions over HTTP
    Serve {
        /// Path to the pretrained weights checkpoint
        #[arg(short, long, default_value = "skindect.mpk")]
        weights: PathBuf,
        /// Address to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(short, long, default_value = "5000")]
        port: u16,
        /// Maximum accepted upload size in bytes
        #[arg(long, default_value = "10485760")]
        body_limit: usize,
    },
    /// Classify a single image and print a ranked report
    Predict {
        /// Path to the pretrained weights checkpoint
        #[arg(short, long, default_value = "skindect.mpk")]
        weights: PathBuf,
        /// Method to output the results
        #[arg(short, long, default_value = "tty")]
        output: Output,
        /// Skip the terminal figure and keep the text report only
        #[arg(long)]
        no_figure: bool,
        /// Path to the image to classify
        image: PathBuf,
    },
    /// generate auto completion script
    GenCompletion {
        /// shell name
        shell: Shell,
    },
}

#[cfg(feature = "tch")]
type MyBackend = burn::backend::LibTorch<f32, i8>;
#[cfg(all(feature = "candle", not(feature = "tch")))]
type MyBackend = burn::backend::Candle<f32, u8>;
#[cfg(all(feature = "ndarray", not(any(feature = "tch", feature = "candle"))))]
type MyBackend = burn::backend::NdArray<f32>;

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    #[cfg(all(feature = "tch", target_os = "macos"))]
    let device = burn::backend::libtorch::LibTorchDevice::Mps;
    #[cfg(all(feature = "tch", not(target_os = "macos")))]
    let device = burn::backend::libtorch::LibTorchDevice::Cuda(0);

    #[cfg(all(feature = "candle", not(feature = "tch"), target_os = "macos"))]
    let device = burn::backend::candle::CandleDevice::Metal(0);
    #[cfg(all(feature = "candle", not(feature = "tch"), not(target_os = "macos")))]
    let device = burn::backend::candle::CandleDevice::Cuda(0);

    #[cfg(all(feature = "ndarray", not(any(feature = "tch", feature = "candle"))))]
    let device = burn::backend::ndarray::NdArrayDevice::default();

    let cli = Cli::parse();
    match cli.subcmd {
        SubCmd::Serve {
            weights,
            host,
            port,
            body_limit,
        } => {
            info!("loading model weights from {}", weights.display());
            let predictor = Predictor::<MyBackend>::load(&weights, device)
                .inspect_err(|e| error!("failed to initialize model: {e}"))?;
            info!(
                params = predictor.num_params(),
                classes = NUM_CLASSES,
                "model ready"
            );
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(serve::serve(predictor, &host, port, body_limit))
        }
        SubCmd::Predict {
            weights,
            output,
            no_figure,
            image,
        } => {
            let predictor = Predictor::<MyBackend>::load(&weights, device)
                .inspect_err(|e| error!("failed to initialize model: {e}"))?;
            let img = data::open_image(&image)?;
            let ranking = Ranking::new(&predictor.predict(&img)?);
            match output {
                Output::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "predicted_class": ranking.predicted_class(),
                        "confidence": ranking.confidence(),
                        "all_predictions": ranking.to_json_map(),
                    }))?
                ),
                Output::Tty => {
                    ranking.print_report();
                    if !no_figure {
                        if let Err(e) = figure::render(&img, &ranking) {
                            warn!("{e}");
                        }
                    }
                }
            }
            Ok(())
        }
        SubCmd::GenCompletion { shell } => {
            generate(shell, &mut Cli::command(), "skindect", &mut std::io::stdout());
            Ok(())
        }
    }
}
