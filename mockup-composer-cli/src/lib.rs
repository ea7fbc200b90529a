use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::Engine;
use clap::{CommandFactory, Parser};
use mockup_composer::{
    LegacyCompositor, LibraryCache, MockupCompositor, MockupRequest,
    OutputFormat, OutputQuality, PerspectiveMode, Scene, SceneRenderer, render_preview,
    source_for_path,
};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

mod cli;

pub fn run() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_logging(args.verbose);

    match args.command {
        Some(Commands::Render {
            templates,
            template,
            design,
            output,
            format,
            quality,
            brightness,
            contrast,
            saturation,
            blend_mode,
            texture,
            texture_opacity,
        }) => {
            let mut request = MockupRequest::new(template, fs::read(&design)?);
            request.format = format;
            request.quality = OutputQuality::new(quality)?;
            let config = &mut request.config;
            if let Some(v) = brightness {
                config.brightness = v;
            }
            if let Some(v) = contrast {
                config.contrast = v;
            }
            if let Some(v) = saturation {
                config.saturation = v;
            }
            if let Some(mode) = blend_mode {
                config.blend_mode = mode;
            }
            config.texture_overlay = texture;
            if let Some(v) = texture_opacity {
                config.texture_opacity = v;
            }
            render(&templates, &request, &output)?;
        }
        Some(Commands::Templates { templates, stats }) => {
            list_templates(&templates, stats)?;
        }
        Some(Commands::Preview {
            templates,
            template,
            output,
        }) => {
            let cache = LibraryCache::from_boxed(source_for_path(&templates));
            let template = cache.get_template(&template)?;
            fs::write(&output, render_preview(&template)?)?;
            tracing::info!(output = %output.display(), "Preview written");
        }
        Some(Commands::Scene {
            design,
            output,
            width,
            height,
            angle,
            depth,
            wall_color,
            perspective,
        }) => {
            let scene = Scene {
                wall_color,
                depth_effect: depth,
                ..Scene::new(width, height, angle)
            };
            let renderer = SceneRenderer::from_mode(perspective);
            let bytes = renderer.render_scene(&scene, &fs::read(design)?)?;
            fs::write(&output, bytes)?;
            tracing::info!(output = %output.display(), "Scene written");
        }
        Some(Commands::Scenes {
            design,
            scenes,
            output_dir,
            perspective,
        }) => {
            render_scenes(&design, &scenes, &output_dir, perspective)?;
        }
        Some(Commands::Legacy {
            assets,
            artwork,
            product_type,
            output,
        }) => {
            let data_url = data_url(&fs::read(&artwork)?)?;
            let compositor = LegacyCompositor::from_boxed(source_for_path(&assets));
            fs::write(&output, compositor.generate_legacy(&data_url, &product_type)?)?;
            tracing::info!(output = %output.display(), "Legacy mockup written");
        }
        None => {
            Cli::command().print_long_help()?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn render(templates: &Path, request: &MockupRequest, output: &Path) -> anyhow::Result<()> {
    let cache = Arc::new(LibraryCache::from_boxed(source_for_path(templates)));
    let result = MockupCompositor::new(cache).generate(request)?;
    fs::write(output, &result.bytes)?;
    tracing::info!(
        width = result.width,
        height = result.height,
        format = result.format.extension(),
        elapsed_ms = result.elapsed.as_millis() as u64,
        output = %output.display(),
        "Mockup rendered"
    );
    Ok(())
}

fn list_templates(templates: &Path, stats: bool) -> anyhow::Result<()> {
    let cache = LibraryCache::from_boxed(source_for_path(templates));
    if stats {
        println!("{}", serde_json::to_string_pretty(&cache.stats()?)?);
        return Ok(());
    }

    let library = cache.load_library(false)?;
    println!("Library version {} ({} templates)", library.version(), library.len());
    for template in library.templates() {
        let meta = &template.metadata;
        let area = meta.print_area;
        println!(
            "{:<28} {:<10} {:<8} {:<8} {}x{}+{}+{}",
            meta.id,
            meta.product_type,
            meta.color,
            meta.angle,
            area.width,
            area.height,
            area.x,
            area.y
        );
    }
    Ok(())
}

fn render_scenes(
    design: &PathBuf,
    scenes: &PathBuf,
    output_dir: &PathBuf,
    perspective: PerspectiveMode,
) -> anyhow::Result<()> {
    let scenes: Vec<Scene> = serde_json::from_slice(&fs::read(scenes)?)?;
    let renderer = SceneRenderer::from_mode(perspective);
    let outcome = renderer.render_batch(&scenes, &fs::read(design)?)?;

    fs::create_dir_all(output_dir)?;
    for mockup in &outcome.mockups {
        let stem = mockup
            .name
            .clone()
            .unwrap_or_else(|| format!("scene-{}", mockup.index));
        let path = output_dir.join(format!("{stem}.{}", OutputFormat::Jpeg.extension()));
        fs::write(&path, &mockup.bytes)?;
        println!("{}", path.display());
    }
    if !outcome.failed.is_empty() {
        tracing::warn!(failed = ?outcome.failed, "Some scenes were skipped");
    }
    Ok(())
}

fn data_url(bytes: &[u8]) -> anyhow::Result<String> {
    let format = image::guess_format(bytes)?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        base64::engine::general_purpose::STANDARD.encode(bytes)
    ))
}

#[cfg(test)]
mod tests {
    use mockup_composer::BlendMode;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_render_overrides() {
        let cli = Cli::try_parse_from([
            "mockup",
            "render",
            "--templates",
            "pack.zip",
            "-t",
            "tshirt-black-front",
            "-d",
            "design.png",
            "-o",
            "out.webp",
            "--format",
            "webp",
            "--blend-mode",
            "screen",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Render {
                format, blend_mode, ..
            }) => {
                assert_eq!(format, OutputFormat::Webp);
                assert_eq!(blend_mode, Some(BlendMode::Screen));
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn negative_scene_angles_parse() {
        let cli = Cli::try_parse_from([
            "mockup", "scene", "-d", "a.png", "-o", "b.jpg", "--angle", "-20", "--perspective",
            "native",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Scene {
                angle, perspective, ..
            }) => {
                assert_eq!(angle, -20.0);
                assert_eq!(perspective, PerspectiveMode::Native);
            }
            _ => panic!("expected scene"),
        }
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn scene_batch_reports_skipped_scenes_through_tracing() {
        let dir = std::env::temp_dir().join(format!("mockup-cli-scenes-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let design = dir.join("design.png");
        image::RgbaImage::from_pixel(16, 16, image::Rgba([20, 40, 60, 255]))
            .save(&design)
            .unwrap();
        let scenes = dir.join("scenes.json");
        fs::write(
            &scenes,
            r#"[{"canvasWidth": 200, "canvasHeight": 150, "angle": 15},
                {"canvasWidth": 0, "canvasHeight": 150}]"#,
        )
        .unwrap();
        let output_dir = dir.join("out");

        let logs = LogBuffer::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            render_scenes(&design, &scenes, &output_dir, PerspectiveMode::Scale).unwrap();
        });

        assert!(output_dir.join("scene-0.jpg").exists());
        assert!(!output_dir.join("scene-1.jpg").exists());
        let logs = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(logs.contains("Some scenes were skipped"));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn data_url_uses_sniffed_mime_type() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        assert!(data_url(&png).unwrap().starts_with("data:image/png;base64,"));
        assert!(data_url(b"plain text").is_err());
    }
}
