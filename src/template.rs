//! The template-resolver collaborator contract (§6). Resolving a vault
//! template file into frontmatter/body text for a brand-new note is treated
//! as a pure function over a token set; this module owns the token tables
//! and the substitution itself, which is simple enough to ship in full (the
//! thing out of scope per §1 is a *user-facing* template picker/editor, not
//! `{{token}}` substitution).

use std::collections::BTreeMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tokens available when resolving a task note template (§6).
#[derive(Debug, Clone, Default)]
pub struct TaskTokens {
    pub title: String,
    pub description: String,
    pub due_date: Option<String>,
    pub due_string: Option<String>,
    pub deadline_date: Option<String>,
    pub priority: Option<String>,
    pub priority_label: Option<String>,
    pub project: Option<String>,
    pub project_id: Option<String>,
    pub section: Option<String>,
    pub section_id: Option<String>,
    pub todoist_id: Option<String>,
    pub url: Option<String>,
    pub tags: Vec<String>,
    pub created: String,
    pub project_link: Option<String>,
    pub section_link: Option<String>,
    pub parent_task_link: Option<String>,
}

/// Tokens available when resolving a project note template (§6).
#[derive(Debug, Clone, Default)]
pub struct ProjectTokens {
    pub project_name: String,
    pub project_id: String,
    pub parent_project_link: Option<String>,
    pub url: Option<String>,
}

/// Tokens available when resolving a section note template (§6).
#[derive(Debug, Clone, Default)]
pub struct SectionTokens {
    pub section_name: String,
    pub section_id: String,
    pub project_name: String,
    pub project_id: String,
    pub project_link: String,
    pub url: Option<String>,
}

/// Which token table a particular `resolve` call draws from.
#[derive(Debug, Clone)]
pub enum TokenContext {
    Task(TaskTokens),
    Project(ProjectTokens),
    Section(SectionTokens),
}

impl TokenContext {
    fn into_map(self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        match self {
            TokenContext::Task(t) => {
                map.insert("title", t.title);
                map.insert("description", t.description);
                map.insert("due_date", t.due_date.unwrap_or_default());
                map.insert("due_string", t.due_string.unwrap_or_default());
                map.insert("deadline_date", t.deadline_date.unwrap_or_default());
                map.insert("priority", t.priority.unwrap_or_default());
                map.insert("priority_label", t.priority_label.unwrap_or_default());
                map.insert("project", t.project.unwrap_or_default());
                map.insert("project_id", t.project_id.unwrap_or_default());
                map.insert("section", t.section.unwrap_or_default());
                map.insert("section_id", t.section_id.unwrap_or_default());
                map.insert("todoist_id", t.todoist_id.unwrap_or_default());
                map.insert("url", t.url.unwrap_or_default());
                map.insert("tags", t.tags.join(", "));
                map.insert("created", t.created);
                map.insert("project_link", t.project_link.unwrap_or_default());
                map.insert("section_link", t.section_link.unwrap_or_default());
                map.insert("parent_task_link", t.parent_task_link.unwrap_or_default());
            }
            TokenContext::Project(p) => {
                map.insert("project_name", p.project_name);
                map.insert("project_id", p.project_id);
                map.insert("parent_project_link", p.parent_project_link.unwrap_or_default());
                map.insert("url", p.url.unwrap_or_default());
            }
            TokenContext::Section(s) => {
                map.insert("section_name", s.section_name);
                map.insert("section_id", s.section_id);
                map.insert("project_name", s.project_name);
                map.insert("project_id", s.project_id);
                map.insert("project_link", s.project_link);
                map.insert("url", s.url.unwrap_or_default());
            }
        }
        map
    }
}

static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

/// Substitutes every `{{token}}` occurrence that appears in `context`'s
/// table; unrecognized tokens (including the date pseudo-tokens, which are
/// applied separately) are left untouched so a malformed template fails
/// loudly rather than silently dropping text.
fn substitute(template: &str, date: NaiveDate, tokens: &BTreeMap<&'static str, String>) -> String {
    let with_date = template
        .replace("{{date}}", &date.format("%Y-%m-%d").to_string())
        .replace("{{date:iso}}", &date.format("%Y-%m-%d").to_string())
        .replace("{{year}}", &date.format("%Y").to_string())
        .replace("{{month}}", &date.format("%m").to_string())
        .replace("{{day}}", &date.format("%d").to_string());

    TOKEN_PATTERN
        .replace_all(&with_date, |caps: &regex::Captures| {
            let key = &caps[1];
            tokens.get(key).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// The collaborator contract the reconciler depends on (§6). Resolution
/// itself is pure and total; the trait exists so the reconciler can be
/// exercised against a stub that records calls instead of substituting.
pub trait TemplateResolver: Send + Sync {
    fn resolve(&self, template: &str, date: NaiveDate, context: TokenContext) -> String;
}

/// The production resolver: plain `{{token}}` substitution plus the date
/// pseudo-tokens, with no external dependencies (no file I/O, no network).
#[derive(Debug, Default)]
pub struct PlainTemplateResolver;

impl TemplateResolver for PlainTemplateResolver {
    fn resolve(&self, template: &str, date: NaiveDate, context: TokenContext) -> String {
        let tokens = context.into_map();
        substitute(template, date, &tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn substitutes_task_tokens() {
        let resolver = PlainTemplateResolver;
        let tokens = TaskTokens {
            title: "Buy milk".into(),
            project: Some("Personal".into()),
            ..Default::default()
        };
        let out = resolver.resolve(
            "# {{title}}\nproject: {{project}}\n",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            TokenContext::Task(tokens),
        );
        assert_eq!(out, "# Buy milk\nproject: Personal\n");
    }

    #[test]
    fn missing_token_fields_render_empty() {
        let resolver = PlainTemplateResolver;
        let out = resolver.resolve(
            "due: {{due_date}}",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            TokenContext::Task(TaskTokens::default()),
        );
        assert_eq!(out, "due: ");
    }

    #[test]
    fn unrecognized_token_left_untouched() {
        let resolver = PlainTemplateResolver;
        let out = resolver.resolve(
            "{{not_a_real_token}}",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            TokenContext::Project(ProjectTokens::default()),
        );
        assert_eq!(out, "{{not_a_real_token}}");
    }

    #[test]
    fn date_pseudo_tokens_resolve() {
        let resolver = PlainTemplateResolver;
        let out = resolver.resolve(
            "{{date}} / {{year}}-{{month}}-{{day}}",
            NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            TokenContext::Section(SectionTokens::default()),
        );
        assert_eq!(out, "2026-03-02 / 2026-03-02");
    }
}
