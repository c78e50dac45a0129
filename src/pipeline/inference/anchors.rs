use super::preprocess::PALM_INPUT_SIZE;

/// Feature map strides of the palm detector and anchors per cell. The three
/// stride-16 layers share one grid.
const ANCHOR_LAYOUT: [(u32, usize); 2] = [(8, 2), (16, 6)];

pub const NUM_ANCHORS: usize = 2016;

/// SSD anchor centers for the 192×192 palm detector, in normalized input
/// coordinates, ordered the way the model emits its predictions.
pub fn palm_anchors() -> Vec<[f32; 2]> {
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);
    for (stride, per_cell) in ANCHOR_LAYOUT {
        let grid = PALM_INPUT_SIZE.div_ceil(stride);
        for y in 0..grid {
            for x in 0..grid {
                let center = [
                    (x as f32 + 0.5) / grid as f32,
                    (y as f32 + 0.5) / grid as f32,
                ];
                anchors.extend(std::iter::repeat_n(center, per_cell));
            }
        }
    }
    anchors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_model_anchor_count_and_order() {
        let anchors = palm_anchors();
        assert_eq!(anchors.len(), NUM_ANCHORS);
        assert_eq!(anchors[0], [0.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1], anchors[0]);
        assert_eq!(anchors[2], [1.5 / 24.0, 0.5 / 24.0]);
        assert_eq!(anchors[1152], [0.5 / 12.0, 0.5 / 12.0]);
        assert_eq!(anchors[NUM_ANCHORS - 1], [11.5 / 12.0, 11.5 / 12.0]);
    }
}
