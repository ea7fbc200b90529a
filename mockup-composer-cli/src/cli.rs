use std::path::PathBuf;

use mockup_composer::{BlendMode, OutputFormat, PerspectiveMode};

#[derive(clap::Parser)]
#[command(version, about = "Composite designs onto product photos")]
pub struct Cli {
    /// Log debug output from the compositing pipeline
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Render a design onto a library template
    Render {
        #[arg(long, env = "MOCKUP_TEMPLATE_SOURCE", default_value = "./resources/templates")]
        templates: PathBuf,
        #[arg(short, long)]
        template: String,
        #[arg(short, long)]
        design: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value = "png")]
        format: OutputFormat,
        #[arg(long, default_value_t = 90)]
        quality: u8,
        #[arg(long)]
        brightness: Option<f32>,
        #[arg(long)]
        contrast: Option<f32>,
        #[arg(long)]
        saturation: Option<f32>,
        #[arg(long)]
        blend_mode: Option<BlendMode>,
        #[arg(long)]
        texture: bool,
        #[arg(long)]
        texture_opacity: Option<f32>,
    },
    /// List the templates of a library
    Templates {
        #[arg(long, env = "MOCKUP_TEMPLATE_SOURCE", default_value = "./resources/templates")]
        templates: PathBuf,
        /// Print aggregate counts instead of the template list
        #[arg(long)]
        stats: bool,
    },
    /// Write a print-area preview of one template
    Preview {
        #[arg(long, env = "MOCKUP_TEMPLATE_SOURCE", default_value = "./resources/templates")]
        templates: PathBuf,
        #[arg(short, long)]
        template: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Render an angled canvas-on-a-wall scene
    Scene {
        #[arg(short, long)]
        design: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long, default_value_t = 800)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        angle: f64,
        #[arg(long, default_value_t = 0.3)]
        depth: f64,
        #[arg(long, default_value = "#ece8e1")]
        wall_color: String,
        #[arg(long, env = "MOCKUP_PERSPECTIVE", default_value = "auto")]
        perspective: PerspectiveMode,
    },
    /// Render every scene of a JSON array into a directory
    Scenes {
        #[arg(short, long)]
        design: PathBuf,
        #[arg(short, long)]
        scenes: PathBuf,
        #[arg(short, long)]
        output_dir: PathBuf,
        #[arg(long, env = "MOCKUP_PERSPECTIVE", default_value = "auto")]
        perspective: PerspectiveMode,
    },
    /// Render with the fixed per-product-type table
    Legacy {
        #[arg(long, env = "MOCKUP_LEGACY_ASSETS", default_value = "./resources/legacy")]
        assets: PathBuf,
        #[arg(short, long)]
        artwork: PathBuf,
        #[arg(short, long, default_value = "t-shirt")]
        product_type: String,
        #[arg(short, long)]
        output: PathBuf,
    },
}
