use std::collections::VecDeque;

use ndarray::ArrayView2;
use tracing::instrument;

/// Components at or below this pixel count are discarded as noise.
const MIN_COMPONENT_PIXELS: usize = 5;

/// Integer pixel coordinate inside the probability field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IntPoint {
    pub x: i32,
    pub y: i32,
}

/// Collects the connected components of the probability field that exceed
/// `threshold`, as 4-connected breadth-first flood fills.
///
/// Seeds are scanned in row-major raster order and a visited bitmap guarantees
/// each pixel lands in at most one component, so membership is deterministic.
/// Runs in O(W*H) time and space.
#[instrument(level = "trace", skip(pred))]
pub fn find_components(pred: ArrayView2<f32>, threshold: f32) -> Vec<Vec<IntPoint>> {
    let height = pred.nrows();
    let width = pred.ncols();
    let at = |idx: usize| pred[[idx / width, idx % width]];

    let mut visited = vec![false; width * height];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            let idx = y * width + x;
            if at(idx) <= threshold || visited[idx] {
                continue;
            }

            let mut component = Vec::new();
            visited[idx] = true;
            queue.push_back(idx);

            while let Some(curr) = queue.pop_front() {
                let cy = curr / width;
                let cx = curr % width;
                component.push(IntPoint {
                    x: cx as i32,
                    y: cy as i32,
                });

                let mut try_push = |n: usize| {
                    if at(n) > threshold && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if cx > 0 {
                    try_push(curr - 1);
                }
                if cx < width - 1 {
                    try_push(curr + 1);
                }
                if cy > 0 {
                    try_push(curr - width);
                }
                if cy < height - 1 {
                    try_push(curr + width);
                }
            }

            if component.len() > MIN_COMPONENT_PIXELS {
                components.push(component);
            }
        }
    }

    components
}
