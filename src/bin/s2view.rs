use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::process;

use s2view::config::{ViewerConfig, EXPORT_FILE_NAME, MAX_BUFFER_DEG, MIN_BUFFER_DEG, SELECTABLE_BANDS};
use s2view::core::{preview_scene, search_scenes, select_scene, to_preview_image};
use s2view::{BoundingBox, DateRange, PlanetaryComputerSigner, StacCatalog};

fn cli() -> Command {
    Command::new("s2view")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Search Sentinel-2 L2A scenes, preview band composites and export GeoTIFFs")
        .arg(
            Arg::new("lat")
                .long("lat")
                .help("Latitude of the area of interest")
                .value_parser(value_parser!(f64))
                .allow_negative_numbers(true)
                .default_value("48.8584"),
        )
        .arg(
            Arg::new("lon")
                .long("lon")
                .help("Longitude of the area of interest")
                .value_parser(value_parser!(f64))
                .allow_negative_numbers(true)
                .default_value("2.2945"),
        )
        .arg(
            Arg::new("buffer")
                .long("buffer")
                .help("Half-width of the search box in degrees (0.01 - 0.1)")
                .value_parser(value_parser!(f64))
                .default_value("0.02"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .help("Start date (YYYY-MM-DD); used only together with --end")
                .value_name("DATE"),
        )
        .arg(
            Arg::new("end")
                .long("end")
                .help("End date (YYYY-MM-DD); used only together with --start")
                .value_name("DATE"),
        )
        .arg(
            Arg::new("scene")
                .short('s')
                .long("scene")
                .help("Index of the scene to load from the search results")
                .value_parser(value_parser!(usize))
                .default_value("0"),
        )
        .arg(
            Arg::new("bands")
                .short('b')
                .long("bands")
                .help("Comma-separated bands (B04: Red, B03: Green, B02: Blue, B08: NIR)")
                .value_delimiter(',')
                .default_value("B04,B03,B02"),
        )
        .arg(
            Arg::new("list")
                .short('l')
                .long("list")
                .help("Only list matching scenes")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("preview")
                .short('p')
                .long("preview")
                .help("Write the normalized composite as a PNG")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .help("Write the raw bands as a GeoTIFF")
                .value_name("FILE")
                .num_args(0..=1)
                .default_missing_value(EXPORT_FILE_NAME)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("JSON configuration file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
}

fn parse_date(matches: &ArgMatches, name: &str) -> Result<Option<NaiveDate>> {
    matches
        .get_one::<String>(name)
        .map(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid --{} date '{}'", name, s)))
        .transpose()
}

fn run(matches: &ArgMatches) -> Result<()> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ViewerConfig::from_json_file(path)?,
        None => ViewerConfig::default(),
    };

    let lat = *matches.get_one::<f64>("lat").context("missing --lat")?;
    let lon = *matches.get_one::<f64>("lon").context("missing --lon")?;
    let buffer = *matches.get_one::<f64>("buffer").context("missing --buffer")?;
    if !(MIN_BUFFER_DEG..=MAX_BUFFER_DEG).contains(&buffer) {
        bail!("--buffer must be between {} and {} degrees", MIN_BUFFER_DEG, MAX_BUFFER_DEG);
    }

    let bbox = BoundingBox::around(lat, lon, buffer)?;
    let date_range = DateRange::from_optional(parse_date(matches, "start")?, parse_date(matches, "end")?)?;

    let catalog = StacCatalog::new(&config)?;
    let scenes = search_scenes(&catalog, &config, &bbox, date_range)?;
    for (index, scene) in scenes.iter().enumerate() {
        println!("[{}] {}  {}", index, scene.label(), scene.id);
    }
    if matches.get_flag("list") {
        return Ok(());
    }

    let bands: Vec<String> = matches
        .get_many::<String>("bands")
        .map(|values| values.map(|b| b.trim().to_uppercase()).collect())
        .unwrap_or_default();
    for band in &bands {
        if !SELECTABLE_BANDS.contains(&band.as_str()) {
            log::warn!("Band {} is not one of {:?}", band, SELECTABLE_BANDS);
        }
    }

    let scene_index = *matches.get_one::<usize>("scene").context("missing --scene")?;
    let scene = select_scene(&scenes, scene_index)?;
    let signer = PlanetaryComputerSigner::new(&config)?;
    let preview = preview_scene(&signer, &config, scene, &bbox, &preview_bands(&bands))?;

    let (rows, cols, count) = preview.stack.data.dim();
    println!(
        "Loaded {} ({}x{}x{} {})",
        preview.scene.id,
        rows,
        cols,
        count,
        preview.stack.data.dtype_name()
    );

    if let Some(path) = matches.get_one::<PathBuf>("preview") {
        to_preview_image(&preview.display)?
            .save(path)
            .with_context(|| format!("failed to write preview {}", path.display()))?;
        println!("Preview written to {}", path.display());
    }

    if let Some(path) = matches.get_one::<PathBuf>("output") {
        let bytes = preview.export_geotiff()?;
        std::fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
        println!("GeoTIFF written to {} ({} bytes)", path.display(), bytes.len());
    }

    Ok(())
}

/// Keep the requested order, dropping repeated bands
fn preview_bands(bands: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(bands.len());
    for band in bands {
        if !unique.contains(band) {
            unique.push(band.clone());
        }
    }
    unique
}

fn main() {
    let matches = cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&matches) {
        log::error!("{:#}", e);
        process::exit(1);
    }
}
