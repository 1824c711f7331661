//! Merging annotations linked by relation groups into single records.

use crate::annotation::{Annotation, AnnotationFile, Label, Region, RelationGroup, TokenId};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::PagemarkError;
use crate::extraction::WordExtractor;
use crate::geometry::{BBox, Bounds, SoftMargin};
use crate::model::{find_page, Token, TokenPage};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// How free-form annotations get their tokens.
pub enum FreeFormStrategy<'a> {
    /// Read the words inside the drawn bounds from the PDF itself. Yields
    /// text but no token positions.
    Extract {
        extractor: &'a dyn WordExtractor,
        pdf_path: &'a Path,
    },
    /// Look the tokens up in the page structure with a containment search.
    Search(SoftMargin),
}

/// An annotation with its tokens resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: String,
    pub page: usize,
    pub label: Label,
    pub bounds: Bounds,
    pub tokens: Vec<Token>,
    pub positions: Vec<TokenId>,
}

/// Union of a group's member bounds on one page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageRegion {
    pub page: usize,
    pub bounds: Bounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedAnnotation {
    /// Sequential id, only stable within one consolidation run.
    pub id: usize,
    pub underlying_ids: Vec<String>,
    pub page: usize,
    pub label: Label,
    /// Union of the member bounds on `page`.
    pub bounds: Bounds,
    /// One region per page the group touches, ascending by page. A group
    /// on a single page has exactly one region, equal to `page`/`bounds`.
    #[serde(default)]
    pub regions: Vec<PageRegion>,
    pub text: String,
    pub tokens: Vec<Token>,
    pub positions: Vec<TokenId>,
}

#[derive(Debug, Clone, Default)]
pub struct Consolidation {
    pub annotations: Vec<ConsolidatedAnnotation>,
    pub diagnostics: Diagnostics,
}

/// Resolve and merge one annotation file.
pub fn consolidate_file(
    file: &AnnotationFile,
    structure: &[TokenPage],
    strategy: &FreeFormStrategy<'_>,
) -> Result<Consolidation, PagemarkError> {
    let mut diagnostics = Diagnostics::new();
    let members = materialize(&file.annotations, structure, strategy, &mut diagnostics)?;
    let resolved: HashSet<&str> = members.iter().map(|m| m.id.as_str()).collect();
    let skipped: HashSet<&str> = file
        .annotations
        .iter()
        .map(|a| a.id.as_str())
        .filter(|id| !resolved.contains(id))
        .collect();
    let annotations = consolidate_skipping(&members, &file.relations, &skipped, &mut diagnostics);
    Ok(Consolidation {
        annotations,
        diagnostics,
    })
}

/// Resolve the tokens of every annotation.
///
/// Annotations pointing at pages or tokens missing from `structure` are
/// dropped with a `MissingReference` diagnostic. Extractor failures are
/// returned as errors.
pub fn materialize(
    annotations: &[Annotation],
    structure: &[TokenPage],
    strategy: &FreeFormStrategy<'_>,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<Member>, PagemarkError> {
    let mut members = Vec::with_capacity(annotations.len());

    for annotation in annotations {
        let resolved = match &annotation.region {
            Region::TokenAligned(ids) => lookup_tokens(annotation, ids, structure),
            Region::FreeForm => match strategy {
                FreeFormStrategy::Extract {
                    extractor,
                    pdf_path,
                } => {
                    let words =
                        extractor.extract_words(pdf_path, annotation.page, &annotation.bounds)?;
                    Ok((words, Vec::new()))
                }
                FreeFormStrategy::Search(margin) => search_tokens(annotation, structure, margin),
            },
        };

        match resolved {
            Ok((tokens, positions)) => members.push(Member {
                id: annotation.id.clone(),
                page: annotation.page,
                label: annotation.label.clone(),
                bounds: annotation.bounds,
                tokens,
                positions,
            }),
            Err(PagemarkError::MissingReference {
                annotation_id,
                page_index,
                token_index,
            }) => {
                let what = match token_index {
                    Some(t) => format!("token {t} on page {page_index}"),
                    None => format!("page {page_index}"),
                };
                diagnostics.push(
                    DiagnosticKind::MissingReference,
                    format!("annotation '{annotation_id}' references missing {what}, skipped"),
                );
            }
            Err(e) => return Err(e),
        }
    }

    Ok(members)
}

type Resolved = (Vec<Token>, Vec<TokenId>);

fn lookup_tokens(
    annotation: &Annotation,
    ids: &[TokenId],
    structure: &[TokenPage],
) -> Result<Resolved, PagemarkError> {
    let mut tokens = Vec::with_capacity(ids.len());
    for id in ids {
        let token = find_page(structure, id.page_index)
            .and_then(|p| p.token(id.token_index))
            .ok_or_else(|| PagemarkError::MissingReference {
                annotation_id: annotation.id.clone(),
                page_index: id.page_index,
                token_index: Some(id.token_index),
            })?;
        tokens.push(token.clone());
    }
    Ok((tokens, ids.to_vec()))
}

fn search_tokens(
    annotation: &Annotation,
    structure: &[TokenPage],
    margin: &SoftMargin,
) -> Result<Resolved, PagemarkError> {
    let page = find_page(structure, annotation.page).ok_or_else(|| {
        PagemarkError::MissingReference {
            annotation_id: annotation.id.clone(),
            page_index: annotation.page,
            token_index: None,
        }
    })?;

    let found = page.filter_tokens_by(&BBox::from_bounds(&annotation.bounds), margin);
    let positions = found
        .keys()
        .map(|&i| TokenId::new(annotation.page, i))
        .collect();
    let tokens = found.into_values().cloned().collect();
    Ok((tokens, positions))
}

/// Merge members linked by relation groups.
///
/// A group's members are its source ids followed by its target ids. Walking
/// `members` in order, the first member of a group seen absorbs the whole
/// group, with tokens concatenated in group order. An id claimed by more
/// than one group stays with the first group and is reported as
/// `AmbiguousRelation`. Ids that match no member are reported as
/// `MissingReference`.
pub fn consolidate(
    members: &[Member],
    relations: &[RelationGroup],
    diagnostics: &mut Diagnostics,
) -> Vec<ConsolidatedAnnotation> {
    consolidate_skipping(members, relations, &HashSet::new(), diagnostics)
}

/// Like [`consolidate`], but relation ids in `skipped` are left out of
/// their groups silently. These are annotations that exist in the file but
/// were already dropped, and reported, while materializing.
pub fn consolidate_skipping(
    members: &[Member],
    relations: &[RelationGroup],
    skipped: &HashSet<&str>,
    diagnostics: &mut Diagnostics,
) -> Vec<ConsolidatedAnnotation> {
    let by_id: HashMap<&str, &Member> = members.iter().map(|m| (m.id.as_str(), m)).collect();

    let mut groups: Vec<Vec<&str>> = Vec::with_capacity(relations.len());
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (group_idx, relation) in relations.iter().enumerate() {
        let mut group = Vec::new();
        for id in relation.members() {
            if skipped.contains(id) {
                continue;
            }
            if !by_id.contains_key(id) {
                diagnostics.push(
                    DiagnosticKind::MissingReference,
                    format!("relation {group_idx} references unknown annotation '{id}', ignored"),
                );
                continue;
            }
            if let Some(&first) = owner.get(id) {
                diagnostics.push(
                    DiagnosticKind::AmbiguousRelation,
                    format!(
                        "annotation '{id}' is claimed by relations {first} and {group_idx}; keeping {first}"
                    ),
                );
                continue;
            }
            owner.insert(id, group_idx);
            group.push(id);
        }
        groups.push(group);
    }

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    for member in members {
        if consumed.contains(member.id.as_str()) {
            continue;
        }

        let group: Vec<&Member> = match owner.get(member.id.as_str()) {
            Some(&g) => groups[g].iter().map(|id| by_id[id]).collect(),
            None => vec![member],
        };

        let mut underlying_ids = Vec::with_capacity(group.len());
        let mut tokens = Vec::new();
        let mut positions = Vec::new();
        for m in &group {
            consumed.insert(m.id.as_str());
            underlying_ids.push(m.id.clone());
            tokens.extend(m.tokens.iter().cloned());
            positions.extend(m.positions.iter().copied());
        }

        let mut per_page: BTreeMap<usize, Vec<BBox>> = BTreeMap::new();
        for m in &group {
            per_page
                .entry(m.page)
                .or_default()
                .push(BBox::from_bounds(&m.bounds));
        }
        let regions: Vec<PageRegion> = per_page
            .into_iter()
            .filter_map(|(page, boxes)| {
                BBox::union(&boxes).ok().map(|b| PageRegion {
                    page,
                    bounds: b.as_bounds(),
                })
            })
            .collect();
        let bounds = regions
            .iter()
            .find(|r| r.page == member.page)
            .map(|r| r.bounds)
            .unwrap_or(member.bounds);

        out.push(ConsolidatedAnnotation {
            id: out.len(),
            underlying_ids,
            page: member.page,
            label: member.label.clone(),
            bounds,
            regions,
            text: join_text(&tokens),
            tokens,
            positions,
        });
    }

    out
}

fn join_text(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Page, PageInfo};

    fn structure() -> Vec<TokenPage> {
        vec![Page {
            page: PageInfo {
                width: 100.0,
                height: 100.0,
                index: 0,
            },
            tokens: vec![
                Token::new("A", 0.0, 0.0, 10.0, 10.0),
                Token::new("B", 12.0, 0.0, 10.0, 10.0),
                Token::new("C", 24.0, 0.0, 10.0, 10.0),
                Token::new("D", 0.0, 50.0, 10.0, 10.0),
            ],
        }]
    }

    fn member(id: &str, tokens: &[&str]) -> Member {
        Member {
            id: id.to_string(),
            page: 0,
            label: Label::new("Section", "#000"),
            bounds: Bounds::default(),
            tokens: tokens
                .iter()
                .map(|t| Token::new(*t, 0.0, 0.0, 1.0, 1.0))
                .collect(),
            positions: Vec::new(),
        }
    }

    fn relation(sources: &[&str], targets: &[&str]) -> RelationGroup {
        RelationGroup {
            source_ids: sources.iter().map(|s| s.to_string()).collect(),
            target_ids: targets.iter().map(|s| s.to_string()).collect(),
            label: Label::new("Continues", "#fff"),
        }
    }

    fn aligned(id: &str, ids: &[(usize, usize)]) -> Annotation {
        Annotation {
            id: id.to_string(),
            page: 0,
            label: Label::new("Section", "#000"),
            bounds: Bounds::default(),
            region: Region::TokenAligned(ids.iter().map(|&(p, t)| TokenId::new(p, t)).collect()),
        }
    }

    #[test]
    fn test_without_relations_one_record_per_member() {
        let members = vec![member("a", &["x"]), member("b", &["y", "z"])];
        let mut diags = Diagnostics::new();
        let out = consolidate(&members, &[], &mut diags);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, 0);
        assert_eq!(out[1].id, 1);
        assert_eq!(out[1].underlying_ids, vec!["b"]);
        assert_eq!(out[1].text, "y z");
        assert!(diags.is_empty());
    }

    #[test]
    fn test_relation_merges_in_declared_order() {
        let members = vec![
            member("a", &["A", "B"]),
            member("x", &["X"]),
            member("b", &["C"]),
        ];
        let mut diags = Diagnostics::new();
        let out = consolidate(&members, &[relation(&["a"], &["b"])], &mut diags);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].underlying_ids, vec!["a", "b"]);
        assert_eq!(out[0].text, "A B C");
        assert_eq!(out[1].underlying_ids, vec!["x"]);
        assert_eq!(out[1].id, 1);
    }

    #[test]
    fn test_anchor_is_first_seen_but_tokens_follow_group_order() {
        let members = vec![member("b", &["C"]), member("a", &["A"])];
        let mut diags = Diagnostics::new();
        let out = consolidate(&members, &[relation(&["a"], &["b"])], &mut diags);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "A C");
    }

    #[test]
    fn test_ambiguous_relation_first_group_wins() {
        let members = vec![member("a", &["A"]), member("b", &["B"]), member("c", &["C"])];
        let mut diags = Diagnostics::new();
        let relations = [relation(&["a"], &["b"]), relation(&["c"], &["b"])];
        let out = consolidate(&members, &relations, &mut diags);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].underlying_ids, vec!["a", "b"]);
        assert_eq!(out[1].underlying_ids, vec!["c"]);
        assert_eq!(diags.count(DiagnosticKind::AmbiguousRelation), 1);
    }

    #[test]
    fn test_relation_to_unknown_id_is_reported() {
        let members = vec![member("a", &["A"])];
        let mut diags = Diagnostics::new();
        let out = consolidate(&members, &[relation(&["a"], &["ghost"])], &mut diags);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].underlying_ids, vec!["a"]);
        assert_eq!(diags.count(DiagnosticKind::MissingReference), 1);
    }

    #[test]
    fn test_consolidate_file_token_aligned() {
        let file = AnnotationFile {
            annotations: vec![aligned("a", &[(0, 0), (0, 1)]), aligned("b", &[(0, 2)])],
            relations: vec![relation(&["a"], &["b"])],
        };
        let result = consolidate_file(
            &file,
            &structure(),
            &FreeFormStrategy::Search(SoftMargin::default()),
        )
        .unwrap();

        assert_eq!(result.annotations.len(), 1);
        let merged = &result.annotations[0];
        assert_eq!(merged.tokens.len(), 3);
        assert_eq!(merged.text, "A B C");
        assert_eq!(
            merged.positions,
            vec![TokenId::new(0, 0), TokenId::new(0, 1), TokenId::new(0, 2)]
        );
    }

    #[test]
    fn test_missing_token_skips_annotation() {
        let file = AnnotationFile {
            annotations: vec![aligned("a", &[(0, 0)]), aligned("bad", &[(0, 99)])],
            relations: vec![],
        };
        let result = consolidate_file(
            &file,
            &structure(),
            &FreeFormStrategy::Search(SoftMargin::default()),
        )
        .unwrap();

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(
            result.diagnostics.count(DiagnosticKind::MissingReference),
            1
        );
    }

    #[test]
    fn test_free_form_search() {
        let file = AnnotationFile {
            annotations: vec![Annotation {
                id: "free".into(),
                page: 0,
                label: Label::new("Section", "#000"),
                bounds: Bounds {
                    left: 0.0,
                    top: 45.0,
                    right: 20.0,
                    bottom: 65.0,
                },
                region: Region::FreeForm,
            }],
            relations: vec![],
        };
        let result = consolidate_file(
            &file,
            &structure(),
            &FreeFormStrategy::Search(SoftMargin::default()),
        )
        .unwrap();

        assert_eq!(result.annotations[0].text, "D");
        assert_eq!(result.annotations[0].positions, vec![TokenId::new(0, 3)]);
    }

    #[test]
    fn test_merged_bounds_cover_members_on_anchor_page() {
        let mut a = member("a", &["A"]);
        a.bounds = Bounds {
            left: 0.0,
            top: 0.0,
            right: 10.0,
            bottom: 10.0,
        };
        let mut b = member("b", &["B"]);
        b.bounds = Bounds {
            left: 50.0,
            top: 20.0,
            right: 60.0,
            bottom: 40.0,
        };
        let mut c = member("c", &["C"]);
        c.page = 1;
        c.bounds = Bounds {
            left: 0.0,
            top: 0.0,
            right: 500.0,
            bottom: 500.0,
        };

        let mut diags = Diagnostics::new();
        let out = consolidate(&[a, b, c], &[relation(&["a"], &["b", "c"])], &mut diags);
        assert_eq!(
            out[0].bounds,
            Bounds {
                left: 0.0,
                top: 0.0,
                right: 60.0,
                bottom: 40.0
            }
        );
        assert_eq!(out[0].regions.len(), 2);
        assert_eq!(out[0].regions[0].bounds, out[0].bounds);
        assert_eq!(out[0].regions[1].page, 1);
        assert_eq!(out[0].regions[1].bounds.right, 500.0);
    }

    #[test]
    fn test_single_page_record_has_one_region() {
        let mut a = member("a", &["A"]);
        a.bounds = Bounds {
            left: 1.0,
            top: 2.0,
            right: 3.0,
            bottom: 4.0,
        };
        let mut diags = Diagnostics::new();
        let out = consolidate(&[a.clone()], &[], &mut diags);
        assert_eq!(
            out[0].regions,
            vec![PageRegion {
                page: 0,
                bounds: a.bounds
            }]
        );
    }

    #[test]
    fn test_relation_to_dropped_annotation_reported_once() {
        let file = AnnotationFile {
            annotations: vec![aligned("a", &[(0, 0)]), aligned("bad", &[(0, 99)])],
            relations: vec![relation(&["a"], &["bad"])],
        };
        let result = consolidate_file(
            &file,
            &structure(),
            &FreeFormStrategy::Search(SoftMargin::default()),
        )
        .unwrap();

        assert_eq!(result.annotations.len(), 1);
        assert_eq!(result.annotations[0].underlying_ids, vec!["a"]);
        assert_eq!(
            result.diagnostics.count(DiagnosticKind::MissingReference),
            1
        );
    }

    #[test]
    fn test_relation_to_id_absent_from_file_still_reported() {
        let file = AnnotationFile {
            annotations: vec![aligned("a", &[(0, 0)]), aligned("bad", &[(0, 99)])],
            relations: vec![relation(&["a"], &["bad", "ghost"])],
        };
        let result = consolidate_file(
            &file,
            &structure(),
            &FreeFormStrategy::Search(SoftMargin::default()),
        )
        .unwrap();

        assert_eq!(
            result.diagnostics.count(DiagnosticKind::MissingReference),
            2
        );
    }
}
