//! Completeness ratio over nested inspection checklists.
//!
//! A checklist is arbitrary JSON. Objects carrying a `status` key are items;
//! every other object or array is a section whose items are counted
//! recursively.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionProgress>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionProgress {
    pub name: String,
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

impl Progress {
    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Whole-number percentage, rounded down so only a finished list reads 100.
fn percent(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed * 100) / total) as u32
}

fn is_item(map: &serde_json::Map<String, Value>) -> bool {
    map.contains_key("status")
}

fn item_done(map: &serde_json::Map<String, Value>) -> bool {
    match map.get("status") {
        Some(Value::String(s)) => {
            let s = s.trim();
            !s.is_empty() && !s.eq_ignore_ascii_case("pending")
        }
        _ => false,
    }
}

fn count(value: &Value) -> (usize, usize) {
    match value {
        Value::Object(map) if is_item(map) => (usize::from(item_done(map)), 1),
        Value::Object(map) => map.values().map(count).fold((0, 0), add),
        Value::Array(items) => items.iter().map(count).fold((0, 0), add),
        _ => (0, 0),
    }
}

fn add(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    (a.0 + b.0, a.1 + b.1)
}

pub fn progress(tree: &Value) -> Progress {
    let (completed, total) = count(tree);
    let sections = match tree {
        Value::Object(map) if !is_item(map) => map
            .iter()
            .filter_map(|(name, value)| {
                let (completed, total) = count(value);
                (total > 0).then(|| SectionProgress {
                    name: name.clone(),
                    completed,
                    total,
                    percent: percent(completed, total),
                })
            })
            .collect(),
        _ => Vec::new(),
    };
    Progress {
        completed,
        total,
        percent: percent(completed, total),
        sections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_tree_is_zero_percent() {
        for tree in [json!({}), json!([]), json!(null), json!("text")] {
            let p = progress(&tree);
            assert_eq!(p.total, 0);
            assert_eq!(p.percent, 0);
            assert!(!p.is_complete());
        }
    }

    #[test]
    fn counts_nested_items() {
        let tree = json!({
            "kitchen": {
                "sink": {"status": "ok"},
                "oven": {"status": "pending"},
                "extras": [{"status": "damaged", "notes": "scratch"}, {"status": ""}]
            },
            "bathroom": [{"status": "ok"}],
            "notes": "free text is ignored"
        });
        let p = progress(&tree);
        assert_eq!((p.completed, p.total), (3, 5));
        assert_eq!(p.percent, 60);
        let names: Vec<&str> = p.sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["bathroom", "kitchen"]);
        assert_eq!(p.sections[0].percent, 100);
        assert_eq!(p.sections[1].completed, 2);
    }

    #[test]
    fn non_string_status_is_incomplete() {
        let tree = json!([
            {"status": null},
            {"status": true},
            {"status": "Pending"},
            {"status": " pending "},
            {"status": "   "}
        ]);
        let p = progress(&tree);
        assert_eq!((p.completed, p.total), (0, 5));
    }

    #[test]
    fn percent_rounds_down() {
        let tree = json!([{"status": "ok"}, {"status": "ok"}, {"status": "pending"}]);
        assert_eq!(progress(&tree).percent, 66);
    }

    #[test]
    fn complete_only_when_every_item_done() {
        let tree = json!({"a": [{"status": "ok"}], "b": {"x": {"status": "good"}}});
        let p = progress(&tree);
        assert!(p.is_complete());
        assert_eq!(p.percent, 100);
    }
}
