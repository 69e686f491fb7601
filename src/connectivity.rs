use crate::arrays::Array2D;
use crate::common::SlicConfig;
use crate::slic::{Clusters, UNASSIGNED};
use assume::assume;
use rayon::current_num_threads;
use rayon::prelude::*;

/// Flattened connected-component labeling of the pixel grid.
#[derive(Debug)]
pub struct ComponentSet {
    pub num_components: u32,
    /// Component id for every pixel, dense in `[0, num_components)`.
    pub component_assignment: Vec<u32>,
    pub num_component_members: Vec<u32>,
    /// First pixel of every component in raster order.
    pub component_leaders: Vec<u32>,
}

/// Union-find over pixel indices with path halving.
///
/// The lower pixel index always wins a merge, so every root is the first
/// pixel of its component in raster order and `flatten()` can hand out
/// component ids in a single forward sweep.
pub struct DisjointSet {
    parents: Vec<u32>,
}

impl DisjointSet {
    pub fn new(size: u32) -> Self {
        assert!(size > 0, "Size must be larger than zero.");
        assert!(size < u32::MAX, "Size must be smaller than {}", u32::MAX);
        DisjointSet {
            parents: (0..size).collect(),
        }
    }

    #[inline]
    pub fn find(&mut self, node: u32) -> u32 {
        let mut root = node as usize;
        while self.parents[root] != root as u32 {
            self.parents[root] = self.parents[self.parents[root] as usize];
            root = self.parents[root] as usize;
        }
        root as u32
    }

    #[inline]
    pub fn merge(&mut self, node_i: u32, node_j: u32) {
        let root_i = self.find(node_i);
        let root_j = self.find(node_j);
        if root_i < root_j {
            self.parents[root_j as usize] = root_i;
        } else if root_j < root_i {
            self.parents[root_i as usize] = root_j;
        }
    }

    pub fn flatten(&mut self) -> ComponentSet {
        let n = self.parents.len();
        let mut component_assignment = vec![u32::MAX; n];
        let mut num_component_members: Vec<u32> = Vec::new();
        let mut component_leaders: Vec<u32> = Vec::new();
        for i in 0..n as u32 {
            let root = self.find(i);
            if root == i {
                component_assignment[i as usize] = component_leaders.len() as u32;
                component_leaders.push(i);
                num_component_members.push(1);
            } else {
                // Roots are minimal pixel indices, so the root's component id
                // is always assigned by the time its members come up.
                let component_no = component_assignment[root as usize];
                debug_assert_ne!(component_no, u32::MAX);
                component_assignment[i as usize] = component_no;
                num_component_members[component_no as usize] += 1;
            }
        }
        ComponentSet {
            num_components: component_leaders.len() as u32,
            component_assignment,
            num_component_members,
            component_leaders,
        }
    }
}

/// Merge equal-label 4-neighbors (left and up sweeps) into one set per
/// connected fragment of the label grid.
pub fn assign_disjoint_set(assignments: &Array2D<u32>) -> DisjointSet {
    let width = assignments.width;
    let mut set = DisjointSet::new(assignments.data.len() as u32);
    for y in 0..assignments.height {
        let row_index = y * width;
        let row = assignments.get_row(y);
        for x in 0..width {
            let index = (row_index + x) as u32;
            if x > 0 && row[x] == row[x - 1] {
                set.merge(index - 1, index);
            }
            if y > 0 && assignments.data[row_index + x - width] == row[x] {
                set.merge(index - width as u32, index);
            }
        }
    }
    set
}

#[inline]
fn find(parent: &mut [u32], node: u32) -> u32 {
    let mut root = node as usize;
    while parent[root] != root as u32 {
        parent[root] = parent[parent[root] as usize];
        root = parent[root] as usize;
    }
    root as u32
}

/// This function implements the CCA repair step.
///
/// Connected fragments below `min_size_factor * cell_size^2` pixels, and any
/// fragment the assignment sweeps left unclaimed, are absorbed into the
/// adjacent region with the most members. Merges cascade through a
/// component-level union-find that keeps sizes current, and ties go to the
/// smallest component id, so the pass is deterministic. Only labels already
/// present in the grid survive, which means the number of distinct labels can
/// only go down, and no pixel stays unassigned.
pub fn enforce_connectivity(clusters: &mut Clusters, config: &SlicConfig) {
    let min_threshold =
        ((config.cell_size * config.cell_size) as f32 * config.min_size_factor).round() as u32;
    let width = clusters.assignments.width;
    let height = clusters.assignments.height;

    let mut disjoint_set = assign_disjoint_set(&clusters.assignments);
    let cc_set = disjoint_set.flatten();
    let num_components = cc_set.num_components as usize;

    // Cluster label carried by each component.
    let labels: Vec<u32> = cc_set
        .component_leaders
        .iter()
        .map(|leader| clusters.assignments.data[*leader as usize])
        .collect();

    // Component adjacency from 4-neighbor pixel pairs with different owners.
    let mut adjacency: Vec<Vec<u32>> = vec![Vec::new(); num_components];
    let comp = &cc_set.component_assignment;
    for y in 0..height {
        for x in 0..width {
            let index = y * width + x;
            let here = comp[index];
            if x > 0 {
                let left = comp[index - 1];
                if left != here {
                    adjacency[here as usize].push(left);
                    adjacency[left as usize].push(here);
                }
            }
            if y > 0 {
                let up = comp[index - width];
                if up != here {
                    adjacency[here as usize].push(up);
                    adjacency[up as usize].push(here);
                }
            }
        }
    }

    let mut parent: Vec<u32> = (0..num_components as u32).collect();
    let mut size: Vec<u32> = cc_set.num_component_members.clone();

    let mut order: Vec<u32> = (0..num_components as u32).collect();
    order.sort_by_key(|c| (cc_set.num_component_members[*c as usize], *c));
    for c in order {
        let root = find(&mut parent, c);
        if root != c {
            // Already absorbed into a larger region.
            continue;
        }
        if labels[c as usize] != UNASSIGNED && size[c as usize] >= min_threshold {
            continue;
        }
        let neighbors = std::mem::take(&mut adjacency[c as usize]);
        let mut target: Option<u32> = None;
        for neighbor in &neighbors {
            let neighbor_root = find(&mut parent, *neighbor);
            if neighbor_root == c {
                continue;
            }
            target = Some(match target {
                None => neighbor_root,
                Some(best) => {
                    let best_size = size[best as usize];
                    let neighbor_size = size[neighbor_root as usize];
                    if neighbor_size > best_size
                        || (neighbor_size == best_size && neighbor_root < best)
                    {
                        neighbor_root
                    } else {
                        best
                    }
                }
            });
        }
        match target {
            Some(target) => {
                parent[c as usize] = target;
                size[target as usize] += size[c as usize];
                adjacency[target as usize].extend(neighbors);
            }
            None => {
                // Single-region grid, nothing to merge into.
                debug_assert_eq!(size[c as usize], (width * height) as u32);
                adjacency[c as usize] = neighbors;
            }
        }
    }

    // Resolve cascaded merges to a final label per original component.
    let final_labels: Vec<u32> = (0..num_components as u32)
        .map(|component| {
            let label = labels[find(&mut parent, component) as usize];
            debug_assert!(label != UNASSIGNED || num_components == 1);
            label
        })
        .collect();

    // Relabeling
    let chunk = clusters
        .assignments
        .data
        .len()
        .div_ceil(current_num_threads());
    clusters
        .assignments
        .data
        .as_mut_slice()
        .par_chunks_mut(chunk)
        .zip(cc_set.component_assignment.par_chunks(chunk))
        .for_each(|(labels_chunk, comps_chunk)| {
            for (label, component) in labels_chunk.iter_mut().zip(comps_chunk) {
                assume!(unsafe: (*component as usize) < final_labels.len(), "component: {component} > {}", final_labels.len());
                *label = final_labels[*component as usize];
            }
        });
}

#[cfg(test)]
mod tests {
    use super::{assign_disjoint_set, enforce_connectivity};
    use crate::arrays::Array2D;
    use crate::common::SlicConfig;
    use crate::slic::{Clusters, UNASSIGNED};
    use std::collections::HashSet;

    fn grid_from_rows(rows: &[Vec<u32>]) -> Array2D<u32> {
        let height = rows.len();
        let width = rows[0].len();
        let flat: Vec<u32> = rows.iter().flatten().copied().collect();
        Array2D::from_slice(&flat, width, height).unwrap()
    }

    fn repair_config(cell_size: usize) -> SlicConfig {
        SlicConfig {
            cell_size,
            alpha: 0.5,
            iterations: 0,
            min_size_factor: 0.25,
        }
    }

    fn distinct(labels: &Array2D<u32>) -> HashSet<u32> {
        labels.data.iter().copied().collect()
    }

    #[test]
    fn components_split_on_label_boundaries() {
        let grid = grid_from_rows(&[
            vec![0, 0, 1, 1],
            vec![0, 0, 1, 1],
            vec![2, 2, 1, 1],
        ]);
        let cc_set = assign_disjoint_set(&grid).flatten();
        assert_eq!(cc_set.num_components, 3);
        assert_eq!(cc_set.num_component_members, vec![4, 6, 2]);
        assert_eq!(cc_set.component_leaders, vec![0, 2, 8]);
    }

    #[test]
    fn small_island_merges_into_largest_neighbor() {
        // A 2-pixel island of label 2 sits inside the label-0 half; the
        // threshold for cell_size 4 is 4 pixels.
        let mut rows: Vec<Vec<u32>> = (0..8)
            .map(|_| (0..12).map(|x| u32::from(x >= 6)).collect())
            .collect();
        rows[3][2] = 2;
        rows[3][3] = 2;
        let mut clusters = Clusters {
            assignments: grid_from_rows(&rows),
            clusters: vec![],
        };
        let before = distinct(&clusters.assignments).len();
        enforce_connectivity(&mut clusters, &repair_config(4));
        let after = distinct(&clusters.assignments);
        assert!(after.len() < before);
        assert!(!after.contains(&2));
        assert_eq!(clusters.assignments[(2, 3)], 0);
        assert_eq!(clusters.assignments[(3, 3)], 0);
    }

    #[test]
    fn large_regions_survive_untouched() {
        let rows: Vec<Vec<u32>> = (0..8)
            .map(|_| (0..12).map(|x| u32::from(x >= 6)).collect())
            .collect();
        let mut clusters = Clusters {
            assignments: grid_from_rows(&rows),
            clusters: vec![],
        };
        let before: Vec<u32> = clusters.assignments.data.to_vec();
        enforce_connectivity(&mut clusters, &repair_config(4));
        assert_eq!(clusters.assignments.data.as_slice(), before.as_slice());
    }

    #[test]
    fn unassigned_fragments_are_always_claimed() {
        let mut rows: Vec<Vec<u32>> = (0..8)
            .map(|_| (0..12).map(|x| u32::from(x >= 6)).collect())
            .collect();
        for x in 0..12 {
            rows[7][x] = UNASSIGNED;
        }
        let mut clusters = Clusters {
            assignments: grid_from_rows(&rows),
            clusters: vec![],
        };
        enforce_connectivity(&mut clusters, &repair_config(4));
        for label in clusters.assignments.data.iter() {
            assert_ne!(*label, UNASSIGNED);
        }
        let after = distinct(&clusters.assignments);
        assert_eq!(after, HashSet::from([0, 1]));
    }

    #[test]
    fn cascaded_merges_keep_sizes_current() {
        // Two adjacent small fragments; both resolve into the surrounding
        // region, and the accumulated size is what the second merge sees.
        let rows = vec![
            vec![0, 0, 0, 0, 0, 0, 0, 0],
            vec![0, 0, 0, 2, 3, 0, 0, 0],
            vec![0, 0, 0, 2, 3, 0, 0, 0],
            vec![0, 0, 0, 0, 0, 0, 0, 0],
        ];
        let mut clusters = Clusters {
            assignments: grid_from_rows(&rows),
            clusters: vec![],
        };
        enforce_connectivity(&mut clusters, &repair_config(4));
        let after = distinct(&clusters.assignments);
        assert_eq!(after, HashSet::from([0]));
    }
}
