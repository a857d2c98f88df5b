use anyhow::Result;
use clap::Parser;
use heroface_core::{
    shared_detector, CompositeError, CompositeRequest, CompositeResult, Compositor, Stage,
};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser, Debug)]
#[command(
    name = "face-composite",
    about = "Composite a hero face onto the main face of a page image",
    long_about = "Composite a hero face onto the main face of a page image.\n\n\
                  Gradient-domain (seamless) blending needs a build with `--features opencv`; \
                  without it every composite uses the alpha-blend fallback."
)]
struct Cli {
    /// Image containing the reference face
    #[arg(long)]
    hero_head: PathBuf,

    /// Page image whose main face is replaced
    #[arg(long)]
    page_image: PathBuf,

    /// Where to write the composited page
    #[arg(long)]
    output: PathBuf,

    /// Extend the mask upward to cover hair (the default)
    #[arg(long = "include-hair")]
    _include_hair: bool,

    /// Mask the face only; takes precedence over --include-hair
    #[arg(long)]
    no_hair: bool,
}

impl Cli {
    fn include_hair(&self) -> bool {
        !self.no_hair
    }

    fn request(&self) -> CompositeRequest {
        CompositeRequest {
            hero_path: self.hero_head.clone(),
            page_path: self.page_image.clone(),
            output_path: self.output.clone(),
            include_hair: self.include_hair(),
        }
    }
}

fn main() -> Result<ExitCode> {
    // stdout carries exactly one JSON line; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = run(&cli.request());

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &result)?;
    writeln!(stdout)?;
    stdout.flush()?;

    Ok(ExitCode::from(result.exit_code()))
}

fn run(request: &CompositeRequest) -> CompositeResult {
    // Input checks come before the detector so a bad path never pays for model load.
    if !request.hero_path.is_file() {
        return CompositeResult::failure(
            CompositeError::HeroHeadNotFound(format!(
                "hero_head not found: {}",
                request.hero_path.display()
            )),
            Stage::Start,
        );
    }
    if !request.page_path.is_file() {
        return CompositeResult::failure(
            CompositeError::PageImageNotFound(format!(
                "page image not found: {}",
                request.page_path.display()
            )),
            Stage::Start,
        );
    }

    let config = config::Config::from_env();
    tracing::debug!(model = %config.detector_model_path().display(), "loading face detector");
    let detector = match shared_detector(&config.detector_config()) {
        Ok(detector) => detector,
        Err(err) => {
            return CompositeResult::failure(CompositeError::from_detector_init(err), Stage::Start)
        }
    };

    Compositor::new(detector).run(request)
}
