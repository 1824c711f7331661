//! Pairwise inter-annotator agreement, over a token table or over the
//! boxes of object-detection datasets.

use crate::error::PagemarkError;
use crate::export::coco::{CocoAnnotation, CocoDataset};
use crate::export::token_table::TokenTable;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

/// IoU thresholds averaged into the headline AP.
const IOU_THRESHOLDS: [f64; 10] = [0.5, 0.55, 0.6, 0.65, 0.7, 0.75, 0.8, 0.85, 0.9, 0.95];
const AP50: usize = 0;
const AP75: usize = 5;
/// Recall levels at which interpolated precision is sampled.
const RECALL_POINTS: usize = 101;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairAgreement {
    pub first: String,
    pub second: String,
    /// Fraction of rows where both annotators gave the same label, with two
    /// unlabeled cells counting as agreement. `None` for an empty table.
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgreementMatrix {
    pub annotators: Vec<String>,
    pub pairs: Vec<PairAgreement>,
}

impl AgreementMatrix {
    /// Agreement between two annotators, in either order. `None` on the
    /// diagonal and for unknown names.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        self.pairs
            .iter()
            .find(|p| (p.first == a && p.second == b) || (p.first == b && p.second == a))
            .and_then(|p| p.accuracy)
    }
}

/// Token-level accuracy for every unordered pair of annotators.
pub fn token_accuracy(table: &TokenTable) -> AgreementMatrix {
    let n = table.annotators.len();
    let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);

    for i in 0..n {
        for j in (i + 1)..n {
            let agreeing = table
                .rows
                .iter()
                .filter(|row| row.labels.get(i) == row.labels.get(j))
                .count();
            let accuracy = if table.rows.is_empty() {
                None
            } else {
                Some(agreeing as f64 / table.rows.len() as f64)
            };
            pairs.push(PairAgreement {
                first: table.annotators[i].clone(),
                second: table.annotators[j].clone(),
                accuracy,
            });
        }
    }

    AgreementMatrix {
        annotators: table.annotators.clone(),
        pairs,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryAp {
    pub category: String,
    /// `None` when the ground truth has no box of this category on the
    /// shared images.
    pub ap: Option<f64>,
}

/// Box agreement of one dataset (the predictions) against another (the
/// ground truth). All values are fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxScores {
    /// Images both datasets put at least one box on. Only these are scored.
    pub shared_images: usize,
    /// Mean AP over IoU thresholds 0.50 to 0.95 and over categories.
    pub ap: Option<f64>,
    pub ap50: Option<f64>,
    pub ap75: Option<f64>,
    pub per_category: Vec<CategoryAp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoxAgreement {
    pub truth: String,
    pub predicted: String,
    #[serde(flatten)]
    pub scores: BoxScores,
}

/// Box agreement for every ordered pair of named datasets, each one in turn
/// taken as the ground truth.
pub fn box_agreement(datasets: &[(String, CocoDataset)]) -> Result<Vec<BoxAgreement>, PagemarkError> {
    let mut out = Vec::with_capacity(datasets.len() * datasets.len().saturating_sub(1));
    for (i, (truth_name, truth)) in datasets.iter().enumerate() {
        for (j, (predicted_name, predicted)) in datasets.iter().enumerate() {
            if i == j {
                continue;
            }
            out.push(BoxAgreement {
                truth: truth_name.clone(),
                predicted: predicted_name.clone(),
                scores: box_scores(truth, predicted)?,
            });
        }
    }
    Ok(out)
}

/// Average precision of `predicted` against `truth`, restricted to images
/// both annotated.
///
/// Boxes carry no confidence, so predictions are ranked in dataset order.
/// On each image a prediction claims the unclaimed ground-truth box of the
/// same category with the highest IoU at or above the threshold.
pub fn box_scores(truth: &CocoDataset, predicted: &CocoDataset) -> Result<BoxScores, PagemarkError> {
    if truth.categories != predicted.categories {
        return Err(PagemarkError::ConfigInvalid(
            "cannot compare datasets built with different categories".into(),
        ));
    }

    let truth_boxes = boxes_by_image(truth)?;
    let predicted_boxes = boxes_by_image(predicted)?;
    let shared: Vec<&str> = truth_boxes
        .keys()
        .filter(|name| predicted_boxes.contains_key(*name))
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut per_category = Vec::with_capacity(truth.categories.len());
    let mut per_threshold: Vec<Vec<f64>> = vec![Vec::new(); IOU_THRESHOLDS.len()];

    for category in &truth.categories {
        let t = category_boxes(&truth_boxes, &shared, category.id);
        let p = category_boxes(&predicted_boxes, &shared, category.id);

        let aps: Option<Vec<f64>> = IOU_THRESHOLDS
            .iter()
            .map(|&threshold| average_precision(&t, &p, threshold))
            .collect();
        let ap = aps.map(|aps| {
            for (k, ap) in aps.iter().enumerate() {
                per_threshold[k].push(*ap);
            }
            mean(&aps).unwrap_or(0.0)
        });
        per_category.push(CategoryAp {
            category: category.name.clone(),
            ap,
        });
    }

    let category_aps: Vec<f64> = per_category.iter().filter_map(|c| c.ap).collect();
    Ok(BoxScores {
        shared_images: shared.len(),
        ap: mean(&category_aps),
        ap50: mean(&per_threshold[AP50]),
        ap75: mean(&per_threshold[AP75]),
        per_category,
    })
}

fn boxes_by_image(dataset: &CocoDataset) -> Result<HashMap<&str, Vec<&CocoAnnotation>>, PagemarkError> {
    let names: HashMap<usize, &str> = dataset
        .images
        .iter()
        .map(|i| (i.id, i.file_name.as_str()))
        .collect();

    let mut out: HashMap<&str, Vec<&CocoAnnotation>> = HashMap::new();
    for annotation in &dataset.annotations {
        let name = names.get(&annotation.image_id).ok_or_else(|| {
            PagemarkError::ConfigInvalid(format!(
                "annotation {} references unknown image {}",
                annotation.id, annotation.image_id
            ))
        })?;
        out.entry(*name).or_default().push(annotation);
    }
    Ok(out)
}

/// Boxes of one category, one list per shared image.
fn category_boxes(
    boxes: &HashMap<&str, Vec<&CocoAnnotation>>,
    shared: &[&str],
    category_id: usize,
) -> Vec<Vec<[f64; 4]>> {
    shared
        .iter()
        .map(|name| {
            boxes
                .get(name)
                .map(|annotations| {
                    annotations
                        .iter()
                        .filter(|a| a.category_id == category_id)
                        .map(|a| a.bbox)
                        .collect()
                })
                .unwrap_or_default()
        })
        .collect()
}

/// Interpolated average precision at one IoU threshold. `truth` and
/// `predicted` hold the boxes of one category, one list per image.
fn average_precision(truth: &[Vec<[f64; 4]>], predicted: &[Vec<[f64; 4]>], threshold: f64) -> Option<f64> {
    let total: usize = truth.iter().map(Vec::len).sum();
    if total == 0 {
        return None;
    }

    let mut hits = Vec::new();
    for (gt, dt) in truth.iter().zip(predicted) {
        let mut claimed = vec![false; gt.len()];
        for d in dt {
            let mut best = None;
            let mut best_iou = threshold;
            for (g, candidate) in gt.iter().enumerate() {
                if claimed[g] {
                    continue;
                }
                let overlap = iou(d, candidate);
                if overlap < best_iou {
                    continue;
                }
                best_iou = overlap;
                best = Some(g);
            }
            if let Some(g) = best {
                claimed[g] = true;
            }
            hits.push(best.is_some());
        }
    }

    let mut matched = 0usize;
    let mut precision = Vec::with_capacity(hits.len());
    let mut recall = Vec::with_capacity(hits.len());
    for (i, hit) in hits.iter().enumerate() {
        if *hit {
            matched += 1;
        }
        precision.push(matched as f64 / (i + 1) as f64);
        recall.push(matched as f64 / total as f64);
    }
    // Precision envelope: best precision at this recall or beyond.
    for i in (1..precision.len()).rev() {
        if precision[i] > precision[i - 1] {
            precision[i - 1] = precision[i];
        }
    }

    let sum: f64 = (0..RECALL_POINTS)
        .map(|k| {
            let level = k as f64 / (RECALL_POINTS - 1) as f64;
            let idx = recall.partition_point(|&r| r < level);
            precision.get(idx).copied().unwrap_or(0.0)
        })
        .sum();
    Some(sum / RECALL_POINTS as f64)
}

/// Intersection over union of two `[x, y, width, height]` boxes.
fn iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let w = (a[0] + a[2]).min(b[0] + b[2]) - a[0].max(b[0]);
    let h = (a[1] + a[3]).min(b[1] + b[3]) - a[1].max(b[1]);
    if w <= 0.0 || h <= 0.0 {
        return 0.0;
    }
    let intersection = w * h;
    let union = a[2] * a[3] + b[2] * b[3] - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Label;
    use crate::config::schema::CategorySet;
    use crate::export::coco::CocoImage;
    use crate::export::token_table::TokenRow;

    fn row(labels: &[Option<&str>]) -> TokenRow {
        TokenRow {
            pdf: "a.pdf".into(),
            page_index: 0,
            index: 0,
            text: "w".into(),
            labels: labels.iter().map(|l| l.map(str::to_string)).collect(),
        }
    }

    #[test]
    fn test_pairwise_accuracy() {
        let table = TokenTable {
            annotators: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![
                row(&[Some("Title"), Some("Title"), None]),
                row(&[None, None, None]),
                row(&[Some("Title"), Some("Paragraph"), Some("Title")]),
                row(&[None, Some("Figure"), None]),
            ],
        };
        let m = token_accuracy(&table);

        assert_eq!(m.pairs.len(), 3);
        assert_eq!(m.get("a", "b"), Some(0.5));
        assert_eq!(m.get("b", "a"), Some(0.5));
        assert_eq!(m.get("a", "c"), Some(0.75));
        assert_eq!(m.get("b", "c"), Some(0.25));
        assert_eq!(m.get("a", "a"), None);
    }

    fn dataset(boxes: &[(&str, usize, [f64; 4])]) -> CocoDataset {
        let categories = CategorySet::new(vec![Label::new("Title", "#1"), Label::new("Figure", "#2")]);
        let mut d = CocoDataset::with_categories(&categories);
        for (file_name, category_id, bbox) in boxes {
            let image_id = match d.images.iter().find(|i| i.file_name == *file_name) {
                Some(image) => image.id,
                None => {
                    let id = d.images.len();
                    d.images.push(CocoImage {
                        id,
                        file_name: file_name.to_string(),
                        height: 100.0,
                        width: 100.0,
                        paper_id: 0,
                        page_number: 0,
                    });
                    id
                }
            };
            d.annotations.push(CocoAnnotation {
                id: d.annotations.len(),
                bbox: *bbox,
                category_id: *category_id,
                image_id,
                area: bbox[2] * bbox[3],
            });
        }
        d
    }

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    #[test]
    fn test_identical_datasets_agree_fully() {
        let d = dataset(&[
            ("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
            ("p_0.jpg", 0, [20.0, 0.0, 10.0, 10.0]),
            ("p_1.jpg", 0, [5.0, 5.0, 30.0, 8.0]),
        ]);
        let scores = box_scores(&d, &d).unwrap();

        assert_eq!(scores.shared_images, 2);
        assert!(close(scores.ap, 1.0));
        assert!(close(scores.ap50, 1.0));
        assert_eq!(scores.per_category[0].category, "Title");
        assert!(close(scores.per_category[0].ap, 1.0));
        assert_eq!(scores.per_category[1].ap, None);
    }

    #[test]
    fn test_partial_overlap_only_counts_at_low_thresholds() {
        // IoU 0.62: a hit at 0.50, 0.55 and 0.60 only.
        let truth = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let predicted = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 6.2])]);
        let scores = box_scores(&truth, &predicted).unwrap();

        assert!(close(scores.ap50, 1.0));
        assert!(close(scores.ap75, 0.0));
        assert!(close(scores.ap, 0.3));
    }

    #[test]
    fn test_false_positive_ranked_first_halves_precision() {
        let truth = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let predicted = dataset(&[
            ("p_0.jpg", 0, [50.0, 50.0, 10.0, 10.0]),
            ("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
        ]);
        let scores = box_scores(&truth, &predicted).unwrap();
        assert!(close(scores.ap, 0.5));

        let reversed = dataset(&[
            ("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
            ("p_0.jpg", 0, [50.0, 50.0, 10.0, 10.0]),
        ]);
        assert!(close(box_scores(&truth, &reversed).unwrap().ap, 1.0));
    }

    #[test]
    fn test_only_mutually_annotated_images_are_scored() {
        let truth = dataset(&[
            ("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
            ("p_1.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
        ]);
        let predicted = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let scores = box_scores(&truth, &predicted).unwrap();

        assert_eq!(scores.shared_images, 1);
        assert!(close(scores.ap, 1.0));

        let disjoint = dataset(&[("q_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let scores = box_scores(&truth, &disjoint).unwrap();
        assert_eq!(scores.shared_images, 0);
        assert_eq!(scores.ap, None);
    }

    #[test]
    fn test_wrong_category_is_a_miss() {
        let truth = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let predicted = dataset(&[("p_0.jpg", 1, [0.0, 0.0, 10.0, 10.0])]);
        let scores = box_scores(&truth, &predicted).unwrap();

        assert!(close(scores.per_category[0].ap, 0.0));
        assert_eq!(scores.per_category[1].ap, None);
        assert!(close(scores.ap, 0.0));
    }

    #[test]
    fn test_box_agreement_covers_ordered_pairs() {
        let a = dataset(&[("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0])]);
        let b = dataset(&[
            ("p_0.jpg", 0, [0.0, 0.0, 10.0, 10.0]),
            ("p_0.jpg", 0, [50.0, 50.0, 10.0, 10.0]),
        ]);
        let pairs = box_agreement(&[("a".into(), a), ("b".into(), b)]).unwrap();

        assert_eq!(pairs.len(), 2);
        assert_eq!((pairs[0].truth.as_str(), pairs[0].predicted.as_str()), ("a", "b"));
        // Against a, b's extra box ranks after the hit and costs nothing.
        // Against b, a reaches recall 0.5 only: 51 of 101 recall levels.
        assert!(close(pairs[0].scores.ap, 1.0));
        assert!(close(pairs[1].scores.ap, 51.0 / 101.0));
    }

    #[test]
    fn test_box_scores_reject_other_categories() {
        let a = dataset(&[]);
        let b = CocoDataset::default();
        assert!(box_scores(&a, &b).is_err());
    }

    #[test]
    fn test_iou() {
        assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[0.0, 0.0, 10.0, 10.0]), 1.0);
        assert_eq!(iou(&[0.0, 0.0, 10.0, 10.0], &[10.0, 0.0, 10.0, 10.0]), 0.0);
        assert!((iou(&[0.0, 0.0, 10.0, 10.0], &[5.0, 0.0, 10.0, 10.0]) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_table_has_no_accuracy() {
        let table = TokenTable {
            annotators: vec!["a".into(), "b".into()],
            rows: Vec::new(),
        };
        let m = token_accuracy(&table);
        assert_eq!(m.pairs.len(), 1);
        assert_eq!(m.get("a", "b"), None);
    }
}
