//! Pure, side-effect-free path computation (§4.2). Nothing in this module
//! touches the file system; the reconciler is responsible for turning a
//! computed [`camino::Utf8PathBuf`] into an actual vault mutation.

use std::collections::{HashMap, HashSet};

use camino::{Utf8Path, Utf8PathBuf};

const MAX_SEGMENT_LEN: usize = 80;

/// Strips path-reserved characters, collapses whitespace, trims, and
/// truncates to [`MAX_SEGMENT_LEN`] display characters (§4.2).
pub fn sanitize(name: &str) -> String {
    let mut collapsed = String::with_capacity(name.len());
    let mut last_was_space = false;
    for c in name.chars() {
        let keep = match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0' => ' ',
            c if c.is_control() => ' ',
            c => c,
        };
        if keep == ' ' {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(keep);
            last_was_space = false;
        }
    }
    let trimmed = collapsed.trim();
    let truncated: String = trimmed.chars().take(MAX_SEGMENT_LEN).collect();
    let truncated = truncated.trim_end();
    if truncated.is_empty() {
        "untitled".to_string()
    } else {
        truncated.to_string()
    }
}

/// Walks from the root through parents to `project_id`, one sanitized
/// segment per level. Cycle-safe: if a cycle is encountered, the first
/// revisited node becomes the root of that chain and a warning is logged
/// (§4.2, §9).
pub fn project_folder_segments(
    project_id: &str,
    names_by_id: &HashMap<String, String>,
    parent_by_id: &HashMap<String, String>,
) -> Vec<String> {
    let mut chain = Vec::new();
    let mut seen = HashSet::new();
    let mut current = project_id.to_string();

    loop {
        if !seen.insert(current.clone()) {
            log::warn!(
                "cycle detected in project parent chain at '{current}'; treating as root for this chain"
            );
            break;
        }
        chain.push(current.clone());
        match parent_by_id.get(&current) {
            Some(parent) if names_by_id.contains_key(parent) => {
                current = parent.clone();
            }
            _ => break,
        }
    }

    chain.reverse();
    chain
        .into_iter()
        .map(|id| {
            names_by_id
                .get(&id)
                .map(|n| sanitize(n))
                .unwrap_or_else(|| sanitize(&id))
        })
        .collect()
}

/// A short, stable suffix derived from an ID, used to disambiguate
/// same-named siblings (§4.2).
fn disambiguation_suffix(id: &str) -> String {
    let short: String = id.chars().rev().take(6).collect::<String>();
    let short: String = short.chars().rev().collect();
    short
}

/// Returns the project segment for `project_id`, appending a disambiguation
/// suffix if another project shares the same sanitized name and was seen
/// earlier in topological order (§4.2).
pub fn disambiguated_project_segment(
    project_id: &str,
    name: &str,
    names_by_id: &HashMap<String, String>,
    topo_order: &[String],
) -> String {
    let sanitized = sanitize(name);
    let mut first_seen: Option<&str> = None;
    for id in topo_order {
        if id == project_id {
            break;
        }
        if let Some(other_name) = names_by_id.get(id) {
            if sanitize(other_name) == sanitized {
                first_seen = Some(id.as_str());
                break;
            }
        }
    }
    match first_seen {
        Some(_) => format!("{sanitized}-{}", disambiguation_suffix(project_id)),
        None => sanitized,
    }
}

/// Same idea as [`disambiguated_project_segment`] but scoped to sections
/// owned by the same project (§4.2).
pub fn disambiguated_section_segment(
    section_id: &str,
    name: &str,
    project_id: &str,
    sections_by_project: &HashMap<String, Vec<(String, String)>>,
) -> String {
    let sanitized = sanitize(name);
    let siblings = sections_by_project
        .get(project_id)
        .map(|v| v.as_slice())
        .unwrap_or(&[]);
    let mut first_seen: Option<&str> = None;
    for (id, sibling_name) in siblings {
        if id == section_id {
            break;
        }
        if sanitize(sibling_name) == sanitized {
            first_seen = Some(id.as_str());
            break;
        }
    }
    match first_seen {
        Some(_) => format!("{sanitized}-{}", disambiguation_suffix(section_id)),
        None => sanitized,
    }
}

/// Configuration governing task file placement (§4.2, §9 for
/// `auto_rename_files` / project-subfolder toggles consumed by the
/// reconciler's relocation logic in §4.5.6).
#[derive(Debug, Clone)]
pub struct TaskPathConfig {
    pub base_folder: Utf8PathBuf,
    pub use_project_subfolders: bool,
    pub use_section_subfolders: bool,
}

/// Computes the base path + optional project segment + optional section
/// segment + sanitized title for a task (§4.2). Does not perform collision
/// resolution against the live vault — callers do that via
/// [`allocate_unique_path`] using the task's `remote_task_id` as the
/// disambiguator per §4.2's "on collision ... append `-{remote_task_id}`".
pub fn task_file_path(
    title: &str,
    project_segment: Option<&str>,
    section_segment: Option<&str>,
    config: &TaskPathConfig,
) -> Utf8PathBuf {
    let mut path = config.base_folder.clone();
    if config.use_project_subfolders {
        if let Some(seg) = project_segment {
            path.push(seg);
        }
    }
    if config.use_section_subfolders {
        if let Some(seg) = section_segment {
            path.push(seg);
        }
    }
    path.push(format!("{}.md", sanitize(title)));
    path
}

/// Collision-safe allocator (§4.2, §4.5.6, §4.5.8 Open Question resolution in
/// §9): given a desired path, a way to check whether an existing path is
/// occupied by a *different* file, and a disambiguator (the remote ID),
/// returns a path guaranteed not to collide with another file.
pub fn allocate_unique_path(
    desired: &Utf8PathBuf,
    disambiguator: &str,
    is_occupied_by_other: impl Fn(&Utf8Path) -> bool,
) -> Utf8PathBuf {
    if !is_occupied_by_other(desired) {
        return desired.clone();
    }
    let stem = desired.file_stem().unwrap_or("untitled").to_string();
    let parent = desired.parent().map(Utf8Path::to_path_buf);
    let with_id = build_path(parent.as_deref(), &format!("{stem}-{disambiguator}"));
    if !is_occupied_by_other(&with_id) {
        return with_id;
    }
    let mut n = 2;
    loop {
        let candidate = build_path(parent.as_deref(), &format!("{stem}-{disambiguator}-{n}"));
        if !is_occupied_by_other(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn build_path(parent: Option<&Utf8Path>, stem: &str) -> Utf8PathBuf {
    let mut p = parent.map(Utf8Path::to_path_buf).unwrap_or_default();
    p.push(format!("{stem}.md"));
    p
}

/// Returns an ordering where parents precede children (§4.2). Projects form
/// a DAG under parent-ID; cycles break arbitrarily but deterministically (by
/// iterating project IDs in sorted order).
pub fn topological_order(projects: &HashMap<String, Option<String>>) -> Vec<String> {
    let mut ids: Vec<&String> = projects.keys().collect();
    ids.sort();

    let mut visited: HashSet<String> = HashSet::new();
    let mut in_progress: HashSet<String> = HashSet::new();
    let mut order = Vec::new();

    fn visit(
        id: &str,
        projects: &HashMap<String, Option<String>>,
        visited: &mut HashSet<String>,
        in_progress: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(id) {
            return;
        }
        if in_progress.contains(id) {
            // cycle: break arbitrarily, do not recurse further
            return;
        }
        in_progress.insert(id.to_string());
        if let Some(Some(parent)) = projects.get(id) {
            if projects.contains_key(parent) {
                visit(parent, projects, visited, in_progress, order);
            }
        }
        in_progress.remove(id);
        if visited.insert(id.to_string()) {
            order.push(id.to_string());
        }
    }

    for id in ids {
        visit(id, projects, &mut visited, &mut in_progress, &mut order);
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sanitize_strips_reserved_chars_and_collapses_whitespace() {
        assert_eq!(sanitize("Buy: milk/eggs?"), "Buy milk eggs");
        assert_eq!(sanitize("  spaced   out  "), "spaced out");
    }

    #[test]
    fn sanitize_truncates_to_80_chars() {
        let long = "x".repeat(200);
        assert_eq!(sanitize(&long).len(), MAX_SEGMENT_LEN);
    }

    #[test]
    fn project_with_no_parent_has_one_segment() {
        let mut names = HashMap::new();
        names.insert("P1".to_string(), "Personal".to_string());
        let parents = HashMap::new();
        assert_eq!(
            project_folder_segments("P1", &names, &parents),
            vec!["Personal".to_string()]
        );
    }

    #[test]
    fn project_chain_orders_root_first() {
        let mut names = HashMap::new();
        names.insert("P1".to_string(), "Work".to_string());
        names.insert("P2".to_string(), "Engineering".to_string());
        names.insert("P3".to_string(), "Backend".to_string());
        let mut parents = HashMap::new();
        parents.insert("P3".to_string(), "P2".to_string());
        parents.insert("P2".to_string(), "P1".to_string());
        assert_eq!(
            project_folder_segments("P3", &names, &parents),
            vec![
                "Work".to_string(),
                "Engineering".to_string(),
                "Backend".to_string()
            ]
        );
    }

    #[test]
    fn project_cycle_produces_finite_segments() {
        let mut names = HashMap::new();
        names.insert("P1".to_string(), "A".to_string());
        names.insert("P2".to_string(), "B".to_string());
        let mut parents = HashMap::new();
        parents.insert("P1".to_string(), "P2".to_string());
        parents.insert("P2".to_string(), "P1".to_string());
        let segments = project_folder_segments("P1", &names, &parents);
        assert!(!segments.is_empty());
        assert!(segments.len() <= 2);
    }

    #[test]
    fn disambiguates_duplicate_names_by_topological_order() {
        let mut names = HashMap::new();
        names.insert("P1".to_string(), "Home".to_string());
        names.insert("P2".to_string(), "Home".to_string());
        let topo = vec!["P1".to_string(), "P2".to_string()];
        assert_eq!(
            disambiguated_project_segment("P1", "Home", &names, &topo),
            "Home"
        );
        assert_ne!(
            disambiguated_project_segment("P2", "Home", &names, &topo),
            "Home"
        );
    }

    #[test]
    fn allocates_unique_path_on_collision() {
        let desired: Utf8PathBuf = "Tasks/Buy milk.md".into();
        let occupied: HashSet<Utf8PathBuf> = ["Tasks/Buy milk.md", "Tasks/Buy milk-A1.md"]
            .into_iter()
            .map(Utf8PathBuf::from)
            .collect();
        let got = allocate_unique_path(&desired, "A1", |p| occupied.contains(p));
        assert_eq!(got, Utf8PathBuf::from("Tasks/Buy milk-A1-2.md"));
    }

    #[test]
    fn allocate_unique_path_returns_desired_when_free() {
        let desired: Utf8PathBuf = "Tasks/Buy milk.md".into();
        let got = allocate_unique_path(&desired, "A1", |_| false);
        assert_eq!(got, desired);
    }

    #[test]
    fn topological_order_places_parents_before_children() {
        let mut projects = HashMap::new();
        projects.insert("P1".to_string(), None);
        projects.insert("P2".to_string(), Some("P1".to_string()));
        projects.insert("P3".to_string(), Some("P2".to_string()));
        let order = topological_order(&projects);
        let idx = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(idx("P1") < idx("P2"));
        assert!(idx("P2") < idx("P3"));
    }
}
