//! Jackknife region construction
//!
//! Regions are built in a single greedy pass: the points are sorted by (rotated) RA and cut
//! into `M` strips by accumulated weight, then each strip is sorted by DEC and cut into the
//! number of regions it owes. The last group of every pass absorbs whatever is left, so the
//! number of groups is always exact. A group is also closed early when the points left are
//! just enough to give every later group its minimum size, so no region is ever empty.

use crate::bounds::rotate_ra;
use crate::planner::PartitionPlan;
use crate::point::total_weight;
use crate::{
    BoundingBox, BoundsTable, DataError, PartitionSpec, Result, WeightedPoint, plan_partition,
};
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative slack on weight thresholds, so that exact multiples of the ideal weight cut
/// where expected despite rounding in `W / N`
const CUT_TOLERANCE: f64 = 1e-9;

/// One jackknife region
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Region {
    id: usize,
    /// Indices into the partitioned point set, in DEC order
    members: Vec<usize>,
    total_weight: f64,
    bounding_box: BoundingBox,
}

impl Region {
    /// 0-based region id (position in the partition)
    #[inline]
    pub fn id(&self) -> usize {
        self.id
    }

    #[inline]
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    #[inline]
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    #[inline]
    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }
}

/// The frozen result of a partition request
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Partition {
    /// Regions indexed by id
    regions: Vec<Region>,
    plan: PartitionPlan,
    ra_rotation: f64,
    point_count: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Partition {
    #[inline]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    #[inline]
    pub fn region(&self, id: usize) -> Option<&Region> {
        self.regions.get(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// The plan the partition was cut with
    #[inline]
    pub fn plan(&self) -> &PartitionPlan {
        &self.plan
    }

    #[inline]
    pub fn ra_rotation(&self) -> f64 {
        self.ra_rotation
    }

    /// Number of points in the partitioned set
    #[inline]
    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Sum of region weights (equals the input weight up to rounding)
    pub fn total_weight(&self) -> f64 {
        self.regions.iter().map(Region::total_weight).sum()
    }

    /// Bounding boxes of all regions, in id order
    pub fn bounds(&self) -> BoundsTable {
        BoundsTable::new(self.regions.iter().map(|r| r.bounding_box).collect())
    }

    /// Region id of every input point, indexed like the partitioned point set
    pub fn assignments(&self) -> Vec<usize> {
        let mut out = vec![0; self.point_count];
        for region in &self.regions {
            for &idx in &region.members {
                out[idx] = region.id;
            }
        }
        out
    }
}

/// An RA strip between the two passes
#[derive(Debug)]
struct RaStrip {
    index: usize,
    members: Vec<usize>,
    weight: f64,
    weight_threshold: f64,
    owed_regions: usize,
}

/// Weight target and minimum size of one group in a greedy pass
#[derive(Debug, Clone, Copy)]
struct CutTarget {
    threshold: f64,
    min_len: usize,
}

/// Split `order` into `targets.len()` consecutive groups by accumulated weight
///
/// `order.len()` must be at least the sum of the targets' `min_len`.
fn greedy_cut(points: &[WeightedPoint], order: &[usize], targets: &[CutTarget]) -> Vec<Vec<usize>> {
    let mut groups = Vec::with_capacity(targets.len());
    let mut reserved: usize = targets.iter().map(|t| t.min_len).sum();
    let mut start = 0;
    let mut acc = 0.0;

    for (i, &idx) in order.iter().enumerate() {
        let current = groups.len();
        if current + 1 >= targets.len() {
            break;
        }
        let target = targets[current];
        acc += points[idx].weight();

        let len = i + 1 - start;
        let remaining = order.len() - (i + 1);
        let reserved_after = reserved - target.min_len;
        let reached = len >= target.min_len && acc >= target.threshold * (1.0 - CUT_TOLERANCE);

        if reached || remaining <= reserved_after {
            groups.push(order[start..=i].to_vec());
            start = i + 1;
            acc = 0.0;
            reserved = reserved_after;
        }
    }

    groups.push(order[start..].to_vec());
    groups
}

/// Cut the whole point set into RA strips
fn cut_in_ra(points: &[WeightedPoint], plan: &PartitionPlan, ra_rotation: f64) -> Vec<RaStrip> {
    if plan.is_single_strip() {
        tracing::debug!("Single RA strip, skipping the RA pass");
        return vec![RaStrip {
            index: 0,
            members: (0..points.len()).collect(),
            weight: plan.total_weight,
            weight_threshold: plan.total_weight,
            owed_regions: plan.regions,
        }];
    }

    tracing::info!("Cutting in the RA direction");
    if ra_rotation != 0.0 {
        tracing::info!("Rotate RA for {ra_rotation:.6} degrees");
    }

    let rotated: Vec<f64> = points
        .iter()
        .map(|p| rotate_ra(p.ra(), ra_rotation))
        .collect();
    let mut order: Vec<usize> = (0..points.len()).collect();
    // Stable: ties keep input order
    order.sort_by(|&a, &b| rotated[a].total_cmp(&rotated[b]));

    let targets: Vec<CutTarget> = plan
        .strips
        .iter()
        .map(|s| CutTarget {
            threshold: s.weight_threshold,
            min_len: s.owed_regions,
        })
        .collect();

    greedy_cut(points, &order, &targets)
        .into_iter()
        .zip(&plan.strips)
        .enumerate()
        .map(|(index, (members, strip))| RaStrip {
            index,
            weight: members.iter().map(|&i| points[i].weight()).sum(),
            members,
            weight_threshold: strip.weight_threshold,
            owed_regions: strip.owed_regions,
        })
        .collect()
}

/// Cut one RA strip into its owed DEC regions
fn cut_in_dec(points: &[WeightedPoint], strip: RaStrip) -> Vec<Vec<usize>> {
    tracing::debug!(
        "RA strip {}: {} points, weight {:.6} (threshold {:.6}), {} regions",
        strip.index,
        strip.members.len(),
        strip.weight,
        strip.weight_threshold,
        strip.owed_regions
    );

    if strip.owed_regions == 1 {
        return vec![strip.members];
    }

    let mut members = strip.members;
    members.sort_by(|&a, &b| points[a].dec().total_cmp(&points[b].dec()));

    let target = CutTarget {
        threshold: strip.weight / strip.owed_regions as f64,
        min_len: 1,
    };
    greedy_cut(points, &members, &vec![target; strip.owed_regions])
}

/// Partition a weighted point set into jackknife regions
///
/// # Errors
/// `InvalidPartitionSpec` / `ZeroTotalWeight` for an invalid request, `InsufficientPoints`
/// when there are fewer points than regions. No partial partition is ever returned.
pub fn partition(points: &[WeightedPoint], spec: &PartitionSpec) -> Result<Partition> {
    #[cfg(feature = "profiling")]
    profiling::scope!("knife::partition");

    if !spec.ra_rotation.is_finite() {
        return Err(DataError::InvalidPartitionSpec(format!(
            "RA rotation must be finite, got {}",
            spec.ra_rotation
        )));
    }
    let plan = plan_partition(total_weight(points), spec.regions, spec.ra_strips)?;
    if points.len() < spec.regions {
        return Err(DataError::InsufficientPoints {
            points: points.len(),
            regions: spec.regions,
        });
    }

    let strips = cut_in_ra(points, &plan, spec.ra_rotation);

    tracing::info!("Cutting in the DEC direction");
    let groups: Vec<Vec<Vec<usize>>> = strips
        .into_par_iter()
        .map(|strip| cut_in_dec(points, strip))
        .collect();

    let regions = groups
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(id, members)| {
            let bounding_box = BoundingBox::from_members(points, &members, spec.ra_rotation)
                .ok_or(DataError::EmptyPointSet)?;
            Ok(Region {
                id,
                total_weight: members.iter().map(|&i| points[i].weight()).sum(),
                members,
                bounding_box,
            })
        })
        .collect::<Result<Vec<Region>>>()?;

    tracing::info!(
        "Made {} jackknife regions from {} points (ideal weight {:.6})",
        regions.len(),
        points.len(),
        plan.region_weight()
    );

    Ok(Partition {
        regions,
        plan,
        ra_rotation: spec.ra_rotation,
        point_count: points.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn pseudo_random(i: usize, salt: f64) -> f64 {
        ((i as f64 * 12.9898 + salt * 78.233).sin() * 43758.5453).fract().abs()
    }

    fn random_points(n: usize) -> Vec<WeightedPoint> {
        (0..n)
            .map(|i| {
                let ra = pseudo_random(i, 1.0) * 360.0;
                let dec = pseudo_random(i, 2.0) * 120.0 - 60.0;
                let weight = 0.5 + pseudo_random(i, 3.0);
                WeightedPoint::new(ra, dec, weight).unwrap()
            })
            .collect()
    }

    fn ra_sets(partition: &Partition, points: &[WeightedPoint]) -> Vec<BTreeSet<u64>> {
        partition
            .regions()
            .iter()
            .map(|r| r.members().iter().map(|&i| points[i].ra() as u64).collect())
            .collect()
    }

    #[test]
    fn test_twelve_points_four_regions() {
        // RA = 10 i + 5, DEC scrambled; input order scrambled as well
        let points: Vec<WeightedPoint> = (0..12)
            .map(|k| (k * 5) % 12)
            .map(|i| {
                let dec = ((i * 7) % 12) as f64 - 6.0;
                WeightedPoint::new(10.0 * i as f64 + 5.0, dec, 1.0).unwrap()
            })
            .collect();
        let spec = PartitionSpec {
            regions: 4,
            ra_strips: 2,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();

        assert_eq!(partition.len(), 4);
        for region in partition.regions() {
            assert_eq!(region.members().len(), 3);
            assert!((region.total_weight() - 3.0).abs() < 1e-12);
        }

        let expected: Vec<BTreeSet<u64>> = vec![
            [5, 25, 45].into_iter().collect(),
            [15, 35, 55].into_iter().collect(),
            [75, 95, 115].into_iter().collect(),
            [65, 85, 105].into_iter().collect(),
        ];
        assert_eq!(ra_sets(&partition, &points), expected);
    }

    #[test]
    fn test_uneven_division() {
        let points = random_points(25)
            .into_iter()
            .map(|p| WeightedPoint::new(p.ra(), p.dec(), 1.0).unwrap())
            .collect::<Vec<_>>();
        let spec = PartitionSpec {
            regions: 5,
            ra_strips: 2,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();
        assert_eq!(partition.len(), 5);

        let owed: Vec<usize> = partition.plan().strips.iter().map(|s| s.owed_regions).collect();
        assert_eq!(owed, vec![2, 3]);

        let ideal = 25.0 / 5.0;
        for region in partition.regions() {
            assert!((region.total_weight() - ideal).abs() <= 1.0);
        }

        // First strip (lowest RA) holds the first two regions
        let mut by_ra: Vec<usize> = (0..points.len()).collect();
        by_ra.sort_by(|&a, &b| points[a].ra().total_cmp(&points[b].ra()));
        let first_strip: BTreeSet<usize> = by_ra[..10].iter().copied().collect();
        let regions_0_1: BTreeSet<usize> = partition.regions()[..2]
            .iter()
            .flat_map(|r| r.members().iter().copied())
            .collect();
        assert_eq!(first_strip, regions_0_1);
    }

    #[test]
    fn test_every_point_in_exactly_one_region() {
        let points = random_points(1000);
        let spec = PartitionSpec {
            regions: 17,
            ra_strips: 4,
            ra_rotation: 45.0,
        };
        let partition = partition(&points, &spec).unwrap();
        assert_eq!(partition.len(), 17);

        let mut seen = vec![0usize; points.len()];
        for region in partition.regions() {
            assert!(!region.members().is_empty());
            for &i in region.members() {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));

        let input: f64 = points.iter().map(|p| p.weight()).sum();
        assert!((partition.total_weight() - input).abs() < 1e-9 * input);
    }

    #[test]
    fn test_ids_are_sequential() {
        let points = random_points(200);
        let partition = partition(&points, &PartitionSpec::default()).unwrap();
        for (i, region) in partition.regions().iter().enumerate() {
            assert_eq!(region.id(), i);
        }
        let assignments = partition.assignments();
        for region in partition.regions() {
            for &m in region.members() {
                assert_eq!(assignments[m], region.id());
            }
        }
    }

    #[test]
    fn test_deterministic() {
        // Many ties in RA and DEC
        let points: Vec<WeightedPoint> = (0..300)
            .map(|i| WeightedPoint::new((i % 7) as f64 * 10.0, (i % 5) as f64, 1.0).unwrap())
            .collect();
        let spec = PartitionSpec {
            regions: 6,
            ra_strips: 3,
            ra_rotation: 0.0,
        };
        let a = partition(&points, &spec).unwrap();
        let b = partition(&points, &spec).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_strip_skips_ra_pass() {
        let points = random_points(90);
        let spec = PartitionSpec {
            regions: 3,
            ra_strips: 1,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();
        assert_eq!(partition.len(), 3);
        // Pure DEC slices: DEC ranges do not interleave
        let boxes = partition.bounds();
        assert!(boxes.boxes()[0].dec_max <= boxes.boxes()[1].dec_min);
        assert!(boxes.boxes()[1].dec_max <= boxes.boxes()[2].dec_min);
    }

    #[test]
    fn test_rotation_moves_the_seam() {
        let points: Vec<WeightedPoint> = (0..20)
            .map(|i| {
                let ra = (350.0 + i as f64).rem_euclid(360.0);
                WeightedPoint::new(ra, i as f64 * 0.1, 1.0).unwrap()
            })
            .collect();
        let one = |rotation| PartitionSpec {
            regions: 1,
            ra_strips: 1,
            ra_rotation: rotation,
        };

        let plain = partition(&points, &one(0.0)).unwrap();
        let b = plain.regions()[0].bounding_box();
        assert_eq!((b.ra_min, b.ra_max), (0.0, 359.0));
        assert!(!b.wraps());

        let rotated = partition(&points, &one(30.0)).unwrap();
        let b = rotated.regions()[0].bounding_box();
        assert_eq!((b.ra_min, b.ra_max), (350.0, 9.0));
        assert!(b.wraps());
        assert!(b.contains(0.5, 1.0));
        assert!(!b.contains(180.0, 1.0));
    }

    #[test]
    fn test_heavy_point_does_not_empty_later_regions() {
        let mut points: Vec<WeightedPoint> = (0..3)
            .map(|i| WeightedPoint::new(i as f64, 0.0, 1.0).unwrap())
            .collect();
        points.push(WeightedPoint::new(3.0, 0.0, 100.0).unwrap());
        let spec = PartitionSpec {
            regions: 2,
            ra_strips: 2,
            ra_rotation: 0.0,
        };
        let partition = partition(&points, &spec).unwrap();
        assert_eq!(partition.len(), 2);
        assert!(partition.regions().iter().all(|r| !r.members().is_empty()));
        assert_eq!(partition.regions()[1].members(), &[3]);
    }

    #[test]
    fn test_errors() {
        let points = random_points(5);
        let spec = |regions, ra_strips| PartitionSpec {
            regions,
            ra_strips,
            ra_rotation: 0.0,
        };
        assert!(matches!(
            partition(&points, &spec(6, 2)),
            Err(DataError::InsufficientPoints {
                points: 5,
                regions: 6
            })
        ));
        assert!(matches!(
            partition(&points, &spec(2, 3)),
            Err(DataError::InvalidPartitionSpec(_))
        ));
        assert!(matches!(
            partition(&[], &spec(1, 1)),
            Err(DataError::ZeroTotalWeight(_))
        ));
        let zero: Vec<WeightedPoint> = (0..4)
            .map(|i| WeightedPoint::new(i as f64, 0.0, 0.0).unwrap())
            .collect();
        assert!(partition(&zero, &spec(2, 1)).unwrap_err().is_invalid_spec());
    }

    #[test]
    fn test_greedy_cut_respects_min_len() {
        let points: Vec<WeightedPoint> = (0..6)
            .map(|i| WeightedPoint::new(i as f64, 0.0, if i == 0 { 50.0 } else { 1.0 }).unwrap())
            .collect();
        let order: Vec<usize> = (0..6).collect();
        let targets = [
            CutTarget {
                threshold: 1.0,
                min_len: 2,
            },
            CutTarget {
                threshold: 1.0,
                min_len: 3,
            },
        ];
        let groups = greedy_cut(&points, &order, &targets);
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3, 4, 5]]);
    }
}
