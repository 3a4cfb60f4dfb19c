use anyhow::Context;
use clap::Parser;
use detection::{
    DetectorConfig, Detector, LabelTable, PostProcessor, ReplayBackend, logging::setup_logging,
    serialization::encode_detections,
};
use ndarray::{Array, IxDyn};

/// Replay a recorded model output through post-processing and print the detections as JSON.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Recording to replay (overrides MODEL_PATH)
    #[arg(long)]
    recording: Option<String>,

    /// Label file, one label per line (overrides LABEL_PATH)
    #[arg(long)]
    labels: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = DetectorConfig::from_env()?;
    if let Some(recording) = args.recording {
        config.model_path = recording;
    }
    if let Some(labels) = args.labels {
        config.label_path = labels;
    }

    setup_logging(&config);

    tracing::info!(
        config = ?config,
        "Loaded configuration"
    );

    let text = std::fs::read_to_string(&config.label_path)
        .with_context(|| format!("failed to read labels {}", config.label_path))?;
    let labels = LabelTable::from_lines(&text);

    let postprocessor = PostProcessor::new(config.head.clone(), labels, config.iou_threshold)?;
    let mut detector = Detector::<ReplayBackend>::load(&config.model_path, postprocessor)?;

    let postprocessor = detector.postprocessor();
    tracing::info!(
        head = postprocessor.head().name(),
        iou_threshold = postprocessor.iou_threshold(),
        num_labels = postprocessor.labels().len(),
        "Detector ready"
    );

    let (width, height) = config.input_size;
    let pixels = Array::<f32, _>::zeros(IxDyn(&[1, 3, height as usize, width as usize]));

    let detections = detector.predict(&pixels.view(), &config.predict_params())?;
    tracing::info!(detections = detections.len(), "Prediction finished");

    println!("{}", encode_detections(&detections)?);
    Ok(())
}
