use itertools::Itertools;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::Catalog;
use crate::data::{CourseCode, TeacherId};

/// Teacher -> distinct subject tags.
pub type ExpertiseMap = BTreeMap<TeacherId, BTreeSet<String>>;

/// Leading alphabetic prefix of a course code, uppercased ("ma101" -> "MA").
pub fn subject_tag(course_code: &str) -> Option<String> {
    let prefix: String = course_code
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    (!prefix.is_empty()).then(|| prefix.to_ascii_uppercase())
}

/// Infers each teacher's subject tags from their historical course pairings.
///
/// Every teacher in `teachers` gets an entry; those without history get an empty set.
/// Pairings for teachers outside `teachers` are ignored.
pub fn infer_expertise<'a>(
    teachers: impl IntoIterator<Item = &'a TeacherId>,
    history: &[(TeacherId, CourseCode)],
) -> ExpertiseMap {
    let mut expertise: ExpertiseMap = teachers
        .into_iter()
        .map(|teacher| (teacher.clone(), BTreeSet::new()))
        .collect();

    let tag_counts = history
        .iter()
        .filter_map(|(teacher, code)| subject_tag(code).map(|tag| (teacher, tag)))
        .counts();

    for ((teacher, tag), count) in tag_counts {
        if let Some(tags) = expertise.get_mut(teacher) {
            trace!("{} taught {} course(s) tagged {}", teacher, count, tag);
            tags.insert(tag);
        }
    }
    expertise
}

/// Folds inferred tags into every teacher's declared expertise. Returns the merged map.
pub fn refine_catalog(catalog: &mut Catalog) -> ExpertiseMap {
    let inferred = infer_expertise(catalog.teachers.keys(), &catalog.history);
    for (id, tags) in inferred {
        if let Some(teacher) = catalog.teachers.get_mut(&id) {
            teacher.expertise.extend(tags);
        }
    }
    let merged: ExpertiseMap = catalog
        .teachers
        .iter()
        .map(|(id, teacher)| (id.clone(), teacher.expertise.clone()))
        .collect();
    debug!(
        "Expertise known for {} of {} teachers",
        merged.values().filter(|tags| !tags.is_empty()).count(),
        merged.len()
    );
    merged
}
