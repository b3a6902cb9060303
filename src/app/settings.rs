use clap::{Args, Parser, Subcommand};
use jackknife_lib::PartitionSpec;
use jackknife_lib::catalog::ColumnLayout;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Sky Jackknife - Split a survey footprint into equal-weight jackknife regions and label
/// catalogs with them
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,

    /// Only log warnings and errors (RUST_LOG takes precedence)
    #[clap(short, long, global = true, default_value = "false")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build regions from a random catalog, then label the data and random catalogs
    Knife(KnifeArgs),
    /// Label one catalog with existing regions (bounds file or grid)
    Label(LabelArgs),
    /// Report the per-region weight balance of a labeled catalog
    Analyze(AnalyzeArgs),
    /// Build regions directly from the footprint of a HEALPix mask
    Mask(MaskArgs),
    /// Write one leave-one-out mask per region
    JkMasks(JkMasksArgs),
    /// Merge several bounds files into one
    CombineBounds(CombineBoundsArgs),
}

/// Shape of the partition
#[derive(Args, Debug, Clone)]
pub struct RegionArgs {
    /// Number of jackknife regions
    #[clap(short = 'n', long, default_value = "20")]
    pub regions: usize,

    /// Number of strips in RA
    #[clap(short = 'm', long, default_value = "5")]
    pub ra_strips: usize,

    /// Rotation in RA (degrees) for footprints crossing RA = 0
    #[clap(long, default_value = "0.0", allow_negative_numbers = true)]
    pub ra_rotation: f64,
}

impl RegionArgs {
    pub fn spec(&self) -> PartitionSpec {
        PartitionSpec {
            regions: self.regions,
            ra_strips: self.ra_strips,
            ra_rotation: self.ra_rotation,
        }
    }
}

/// Catalog columns (0-based)
#[derive(Args, Debug, Clone)]
pub struct ColumnArgs {
    /// RA column
    #[clap(long, default_value = "0")]
    pub ra_col: usize,

    /// DEC column
    #[clap(long, default_value = "1")]
    pub dec_col: usize,

    /// Weight column
    #[clap(long, default_value = "3")]
    pub weight_col: usize,

    /// Give every point unit weight instead of reading a weight column
    #[clap(long, default_value = "false")]
    pub unit_weight: bool,
}

impl ColumnArgs {
    pub fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            ra: self.ra_col,
            dec: self.dec_col,
            weight: (!self.unit_weight).then_some(self.weight_col),
        }
    }
}

/// How labels are emitted
#[derive(Args, Debug, Clone)]
pub struct LabelingArgs {
    /// Labeling method: "bounds" or "grid"
    #[clap(long, default_value = "bounds")]
    pub mode: String,

    /// Label of the first region (labels are id_base..id_base + N)
    #[clap(long, default_value = "0")]
    pub id_base: usize,

    /// Keep points outside every region, labeled -1
    #[clap(long, default_value = "false")]
    pub keep_lost: bool,
}

#[derive(Args, Debug, Clone)]
pub struct KnifeArgs {
    /// Random catalog (RA, DEC, redshift, weight)
    #[clap(short, long, value_name = "FILE")]
    pub randoms: PathBuf,

    /// Data catalog to label with the regions
    #[clap(short, long, value_name = "FILE")]
    pub data: Option<PathBuf>,

    #[clap(flatten)]
    pub regions: RegionArgs,

    #[clap(flatten)]
    pub columns: ColumnArgs,

    #[clap(flatten)]
    pub labeling: LabelingArgs,

    /// HEALPix resolution of the region grid
    #[clap(long, default_value = "256")]
    pub nside: u32,

    /// Existing bounds file: skip building regions and label with it directly
    #[clap(long, value_name = "FILE")]
    pub bounds_in: Option<PathBuf>,

    /// Output bounds file
    #[clap(long, value_name = "FILE", default_value = "out_jk_bounds.dat")]
    pub bounds_out: PathBuf,

    /// Output region grid (JSON)
    #[clap(long, value_name = "FILE")]
    pub grid_out: Option<PathBuf>,

    /// Only build the regions, do not label any catalog
    #[clap(long, default_value = "false")]
    pub no_label: bool,

    /// Output labeled data catalog
    #[clap(long, value_name = "FILE", default_value = "out_data_jk.dat")]
    pub data_out: PathBuf,

    /// Output labeled random catalog
    #[clap(long, value_name = "FILE", default_value = "out_rand_jk.dat")]
    pub randoms_out: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct LabelArgs {
    /// Catalog to label
    #[clap(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Bounds file of the regions
    #[clap(long, value_name = "FILE", conflicts_with = "grid", required_unless_present = "grid")]
    pub bounds: Option<PathBuf>,

    /// Region grid (JSON) of the regions
    #[clap(long, value_name = "FILE")]
    pub grid: Option<PathBuf>,

    #[clap(flatten)]
    pub columns: ColumnArgs,

    /// Label of the first region
    #[clap(long, default_value = "0")]
    pub id_base: usize,

    /// Keep points outside every region, labeled -1
    #[clap(long, default_value = "false")]
    pub keep_lost: bool,

    /// Output labeled catalog
    #[clap(short, long, value_name = "FILE", default_value = "out_data_jk.dat")]
    pub output: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Labeled catalog (last column is the region label)
    #[clap(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Expected number of regions (defaults to the number of labels seen)
    #[clap(short = 'n', long)]
    pub regions: Option<usize>,

    #[clap(flatten)]
    pub columns: ColumnArgs,
}

#[derive(Args, Debug, Clone)]
pub struct MaskArgs {
    /// HEALPix mask (JSON, Galactic RING map)
    #[clap(long, value_name = "FILE")]
    pub mask: PathBuf,

    #[clap(flatten)]
    pub regions: RegionArgs,

    /// Output region grid (JSON)
    #[clap(long, value_name = "FILE", default_value = "out_jk_map.json")]
    pub grid_out: PathBuf,

    /// Output bounds file
    #[clap(long, value_name = "FILE")]
    pub bounds_out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct JkMasksArgs {
    /// HEALPix mask (JSON, Galactic RING map)
    #[clap(long, value_name = "FILE")]
    pub mask: PathBuf,

    /// Bounds file of the regions
    #[clap(long, value_name = "FILE")]
    pub bounds: PathBuf,

    /// Output file root, masks are written to <root>_jk_<i>.json
    #[clap(long, default_value = "mask")]
    pub root: String,
}

#[derive(Args, Debug, Clone)]
pub struct CombineBoundsArgs {
    /// Bounds files, concatenated in order
    #[clap(required = true, num_args = 1.., value_name = "FILE")]
    pub inputs: Vec<PathBuf>,

    /// Output bounds file
    #[clap(short, long, value_name = "FILE", default_value = "out_jk_bounds.dat")]
    pub output: PathBuf,
}
