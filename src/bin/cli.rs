use anyhow::{bail, Context, Result};
use idcapture::config::IdCaptureConfig;
use idcapture::mrz;
use idcapture::quality::{default_roi, measure_with_quad};
use idcapture::readiness::dynamic_sharpness_floor;
use idcapture::types::{Frame, Quadrilateral};
use std::env;
use std::path::PathBuf;

fn main() -> Result<()> {
    idcapture::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: idcapture-cli <command> [args]");
        eprintln!("Commands: measure, config-init, config-check, probe-text, info");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "measure" => cmd_measure(&args),
        "config-init" => cmd_config_init(&args),
        "config-check" => cmd_config_check(&args),
        "probe-text" => cmd_probe_text(&args),
        "info" => cmd_info(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn wants_json(args: &[String]) -> bool {
    args.iter().any(|a| a == "--json")
}

/// Positional arguments after the command, flags removed.
fn positional(args: &[String]) -> Vec<&String> {
    args.iter().skip(2).filter(|a| !a.starts_with("--")).collect()
}

fn cmd_measure(args: &[String]) -> Result<()> {
    // measure <image> [--assume-card] [--json]
    let Some(path) = positional(args).first().copied() else {
        bail!("Usage: idcapture-cli measure <image> [--assume-card] [--json]");
    };
    let assume_card = args.iter().any(|a| a == "--assume-card");
    let config = IdCaptureConfig::load_layered(IdCaptureConfig::default_path())
        .context("loading configuration")?;

    let image = image::open(path)
        .with_context(|| format!("opening {}", path))?
        .to_rgb8();
    let (width, height) = image.dimensions();
    let frame = Frame::from_rgb_image(image, 0.0);
    let roi = default_roi(width, height, config.guide.default_width_fraction);

    // No detector is available offline; optionally treat the guide as the card.
    let quad = assume_card.then(|| Quadrilateral::from_rect(roi, 1.0));
    let metrics = measure_with_quad(&frame, roi, quad.as_ref());
    let floor = dynamic_sharpness_floor(metrics.coverage, &config.readiness);

    if wants_json(args) {
        let report = serde_json::json!({
            "width": width,
            "height": height,
            "roi": roi,
            "metrics": metrics,
            "sharpness_floor": floor,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Image: {}x{}", width, height);
        println!(
            "ROI: {:.0},{:.0} {:.0}x{:.0}",
            roi.x, roi.y, roi.width, roi.height
        );
        println!(
            "Sharpness: {:.5} (floor {:.5}, {})",
            metrics.sharpness,
            floor,
            if metrics.sharpness >= floor { "ok" } else { "soft" }
        );
        println!("Coverage: {:.3}  Aspect: {:.3}", metrics.coverage, metrics.aspect_ratio);
        println!(
            "Brightness: {:.3}  Chroma: {:.4}  Glare: {:.3}  White-out: {}",
            metrics.brightness, metrics.chroma, metrics.glare, metrics.white_out
        );
        println!(
            "Rainbow: {:.4} across {} hue bins",
            metrics.rainbow_score, metrics.hue_bins_present
        );
    }
    Ok(())
}

fn cmd_config_init(args: &[String]) -> Result<()> {
    let path = positional(args)
        .first()
        .map(|p| PathBuf::from(p.as_str()))
        .unwrap_or_else(IdCaptureConfig::default_path);
    if path.exists() && !args.iter().any(|a| a == "--force") {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    IdCaptureConfig::default()
        .save_to_file(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

fn cmd_config_check(args: &[String]) -> Result<()> {
    let path = positional(args)
        .first()
        .map(|p| PathBuf::from(p.as_str()))
        .unwrap_or_else(IdCaptureConfig::default_path);
    let config = IdCaptureConfig::load_layered(&path)
        .with_context(|| format!("checking {}", path.display()))?;

    if wants_json(args) {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}: OK", path.display());
        println!(
            "fire at {}/{} after {:.2}s still, OVD {}",
            config.readiness.fire_threshold,
            config.readiness.score_max,
            config.readiness.required_stable_secs,
            if config.ovd.enabled { "enabled" } else { "disabled" }
        );
    }
    Ok(())
}

fn cmd_probe_text(args: &[String]) -> Result<()> {
    // probe-text <line> [<line>...] [--json]
    let lines = positional(args);
    if lines.is_empty() {
        bail!("Usage: idcapture-cli probe-text <line> [<line>...] [--json]");
    }
    let config = IdCaptureConfig::load_layered(IdCaptureConfig::default_path())
        .context("loading configuration")?;
    let signals = mrz::classify(&lines, &config.mrz);

    if wants_json(args) {
        println!("{}", serde_json::to_string(&signals)?);
    } else {
        println!(
            "chevrons={} long_lines={} country={} date={} national_id={}",
            signals.chevrons,
            signals.long_lines,
            signals.country_code,
            signals.date_run,
            signals.national_id_run
        );
        println!("{}", if signals.mrz_like { "MRZ-like" } else { "not MRZ" });
    }
    Ok(())
}

fn cmd_info(args: &[String]) -> Result<()> {
    let info = idcapture::get_info();
    if wants_json(args) {
        println!("{}", serde_json::to_string(&info)?);
    } else {
        println!("{} {}: {}", info.name, info.version, info.description);
    }
    Ok(())
}
