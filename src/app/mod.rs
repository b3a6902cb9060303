//! Command pipelines of the `jackknife` binary

pub(crate) mod settings;

use jackknife_lib::catalog::{self, ColumnLayout};
use jackknife_lib::{
    BoundsTable, DataError, LabelMethod, LabelOptions, RegionLookup, SkyMask, SphericalGrid,
    WeightedPoint, analyze_balance, build_grid, jackknife_masks, label, partition, partition_mask,
};
use settings::{
    AnalyzeArgs, CombineBoundsArgs, Command, JkMasksArgs, KnifeArgs, LabelArgs, MaskArgs, Settings,
};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Invalid arguments: {0}")]
    Usage(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Run the selected command
pub fn run(settings: Settings) -> Result<()> {
    match settings.command {
        Command::Knife(args) => knife(&args),
        Command::Label(args) => label_catalog(&args),
        Command::Analyze(args) => analyze(&args),
        Command::Mask(args) => mask(&args),
        Command::JkMasks(args) => jk_masks(&args),
        Command::CombineBounds(args) => combine_bounds(&args),
    }
}

fn knife(args: &KnifeArgs) -> Result<()> {
    let method: LabelMethod = args.labeling.mode.parse()?;
    let layout = args.columns.layout();
    let randoms = catalog::load_points(&args.randoms, &layout)?;

    let lookup = match &args.bounds_in {
        Some(path) => {
            if method == LabelMethod::Grid {
                return Err(AppError::Usage(
                    "a bounds file can only be used with --mode bounds".to_string(),
                ));
            }
            RegionLookup::Bounds(BoundsTable::load(path)?)
        }
        None => {
            tracing::info!("====== Making jackknife regions ======");
            let partition = partition(&randoms, &args.regions.spec())?;
            let bounds = partition.bounds();
            bounds.save(&args.bounds_out)?;

            let grid = if method == LabelMethod::Grid || args.grid_out.is_some() {
                Some(build_grid(&partition, &randoms, args.nside)?)
            } else {
                None
            };
            if let (Some(grid), Some(path)) = (&grid, &args.grid_out) {
                grid.save_json(path)?;
            }
            if args.no_label {
                return Ok(());
            }
            match grid {
                Some(grid) if method == LabelMethod::Grid => RegionLookup::Grid(grid),
                _ => RegionLookup::Bounds(bounds),
            }
        }
    };

    let options = LabelOptions {
        id_offset: args.labeling.id_base,
        drop_lost: !args.labeling.keep_lost,
    };
    if let Some(data_path) = &args.data {
        tracing::info!("====== Labeling data points ======");
        let data = catalog::load_points(data_path, &layout)?;
        label_and_save(&data, &lookup, options, &args.data_out)?;
    }

    tracing::info!("====== Labeling random points ======");
    let labels = label_and_save(&randoms, &lookup, options, &args.randoms_out)?;

    let expected = match &lookup {
        RegionLookup::Bounds(table) => Some(table.len()),
        RegionLookup::Grid(_) => Some(args.regions.regions),
    };
    // Lost randoms are not part of any region
    if labels.iter().any(|l| l.region.is_some()) {
        analyze_balance(&randoms, &labels, expected)?;
    }
    Ok(())
}

/// Label points, write the labeled catalog and return the labels
fn label_and_save(
    points: &[WeightedPoint],
    lookup: &RegionLookup,
    options: LabelOptions,
    output: &Path,
) -> Result<Vec<jackknife_lib::Label>> {
    let result = label(points, lookup, options);
    let (labels, _) = result.into_parts();
    catalog::save_labeled(output, points, &labels)?;
    Ok(labels)
}

fn label_catalog(args: &LabelArgs) -> Result<()> {
    let lookup = match (&args.bounds, &args.grid) {
        (Some(path), None) => RegionLookup::Bounds(BoundsTable::load(path)?),
        (None, Some(path)) => RegionLookup::Grid(SphericalGrid::load_json(path)?),
        _ => {
            return Err(AppError::Usage(
                "exactly one of --bounds and --grid is required".to_string(),
            ));
        }
    };
    let points = catalog::load_points(&args.input, &args.columns.layout())?;
    let options = LabelOptions {
        id_offset: args.id_base,
        drop_lost: !args.keep_lost,
    };
    label_and_save(&points, &lookup, options, &args.output)?;
    Ok(())
}

fn analyze(args: &AnalyzeArgs) -> Result<()> {
    let layout: ColumnLayout = args.columns.layout();
    let (points, labels) = catalog::load_labeled(&args.input, &layout)?;
    let report = analyze_balance(&points, &labels, args.regions)?;

    tracing::info!(
        "Total weight {:.6}, ideal weight per region {:.6}",
        report.total_weight,
        report.ideal_weight
    );
    for region in &report.regions {
        tracing::info!(
            "Region {:>4}: {:>10} points, weight {:>14.6}, deviation {:>+9.3} %",
            region.region,
            region.count,
            region.weight,
            region.deviation_percent
        );
    }
    Ok(())
}

fn mask(args: &MaskArgs) -> Result<()> {
    let mask = SkyMask::load_json(&args.mask)?;
    let (partition, grid, _) = partition_mask(&mask, &args.regions.spec())?;
    grid.save_json(&args.grid_out)?;
    if let Some(path) = &args.bounds_out {
        partition.bounds().save(path)?;
    }
    Ok(())
}

fn jk_masks(args: &JkMasksArgs) -> Result<()> {
    let mask = SkyMask::load_json(&args.mask)?;
    let bounds = BoundsTable::load(&args.bounds)?;
    for (i, jk) in jackknife_masks(&mask, &bounds).iter().enumerate() {
        let path = format!("{}_jk_{i}.json", args.root);
        jk.save_json(&path)?;
    }
    Ok(())
}

fn combine_bounds(args: &CombineBoundsArgs) -> Result<()> {
    let tables = args
        .inputs
        .iter()
        .map(BoundsTable::load)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let combined = BoundsTable::concat(tables);
    tracing::info!(
        "Combined {} bounds files into {} regions",
        args.inputs.len(),
        combined.len()
    );
    combined.save(&args.output)?;
    Ok(())
}
