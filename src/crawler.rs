//! Remote folder-tree crawler.
//!
//! Walks one branch root two levels deep: year folders under the root,
//! then either category subfolders or files directly under a year. Every
//! discovered file leaves the crawl already classified with its branch,
//! year, and document category.
//!
//! Unreadable or unclassifiable folders are skipped with a warning; a bad
//! folder never aborts the rest of the crawl.

use crate::error::Result;
use crate::models::{Category, DiscoveredFile, DocFormat, RemoteEntry};
use crate::drive::RemoteDrive;

/// Extract the academic year from a folder name: the first ASCII digit,
/// accepted only in 1..=4. `"1st Year"` → 1, `"Year 2"` → 2, `"3"` → 3;
/// `"Semester 9"` has no acceptable digit and yields `None`.
pub fn detect_year(folder_name: &str) -> Option<u8> {
    let digit = folder_name.chars().find(|c| c.is_ascii_digit())?;
    let year = digit.to_digit(10)? as u8;
    (1..=4).contains(&year).then_some(year)
}

/// Classify a subfolder name into a document category by case-insensitive
/// keyword match. Anything unrecognized is treated as notes.
pub fn classify_category(folder_name: &str) -> Category {
    let name = folder_name.to_lowercase();
    if name.contains("syllabus") {
        Category::Syllabus
    } else if name.contains("timetable") || name.contains("schedule") {
        Category::Timetable
    } else if name.contains("question") || name.contains("exam") || name.contains("paper") {
        Category::QuestionPaper
    } else if name.contains("assignment") {
        Category::Assignment
    } else if name.contains("note") {
        Category::Notes
    } else {
        Category::Notes
    }
}

/// Crawl one branch root and return every classified, ingestible file.
///
/// Listing failures below the root are isolated: the affected folder is
/// skipped and the crawl continues. A failure to list the root itself is
/// returned to the caller, since the whole branch is unreachable.
pub async fn crawl_branch(
    remote: &dyn RemoteDrive,
    branch: &str,
    root_folder_id: &str,
) -> Result<Vec<DiscoveredFile>> {
    let mut discovered = Vec::new();
    let year_folders = remote.list_children(root_folder_id).await?;

    for year_folder in year_folders.iter().filter(|e| e.is_folder()) {
        let Some(year) = detect_year(&year_folder.name) else {
            tracing::warn!(
                branch,
                folder = %year_folder.name,
                "cannot detect year from folder name, skipping"
            );
            continue;
        };

        let children = match remote.list_children(&year_folder.id).await {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!(branch, year, error = %e, "year folder unreadable, skipping");
                continue;
            }
        };

        for child in children {
            if child.is_folder() {
                let category = classify_category(&child.name);
                let files = match remote.list_children(&child.id).await {
                    Ok(files) => files,
                    Err(e) => {
                        tracing::warn!(
                            branch,
                            year,
                            folder = %child.name,
                            error = %e,
                            "category folder unreadable, skipping"
                        );
                        continue;
                    }
                };
                for file in files {
                    push_if_supported(&mut discovered, file, branch, year, category);
                }
            } else {
                // Files directly under a year folder default to notes.
                push_if_supported(&mut discovered, child, branch, year, Category::Notes);
            }
        }
    }

    Ok(discovered)
}

fn push_if_supported(
    discovered: &mut Vec<DiscoveredFile>,
    entry: RemoteEntry,
    branch: &str,
    year: u8,
    category: Category,
) {
    if entry.is_folder() {
        // Third-level folders are out of scope.
        return;
    }
    if !DocFormat::is_supported(&entry.mime_type) {
        tracing::debug!(file = %entry.name, mime = %entry.mime_type, "unsupported type, skipping");
        return;
    }
    discovered.push(DiscoveredFile {
        entry,
        branch: branch.to_uppercase(),
        year,
        category,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn year_detection_table() {
        assert_eq!(detect_year("1st Year"), Some(1));
        assert_eq!(detect_year("Year 2"), Some(2));
        assert_eq!(detect_year("3"), Some(3));
        assert_eq!(detect_year("year-4 (final)"), Some(4));
        assert_eq!(detect_year("Semester 9"), None);
        assert_eq!(detect_year("Archive"), None);
        // First digit wins, even when a later one would be in range.
        assert_eq!(detect_year("Batch 2023 Year 1"), Some(2));
    }

    #[test]
    fn category_keyword_table() {
        assert_eq!(classify_category("Syllabus 2024"), Category::Syllabus);
        assert_eq!(classify_category("Time Table"), Category::Notes);
        assert_eq!(classify_category("Exam Schedule"), Category::Timetable);
        assert_eq!(
            classify_category("Mid Sem Question Papers"),
            Category::QuestionPaper
        );
        assert_eq!(classify_category("ASSIGNMENTS"), Category::Assignment);
        assert_eq!(classify_category("Lecture Notes"), Category::Notes);
        assert_eq!(classify_category("Random Stuff"), Category::Notes);
    }

    #[test]
    fn assignment_wins_over_note_keyword() {
        assert_eq!(classify_category("Assignment Notes"), Category::Assignment);
    }
}
