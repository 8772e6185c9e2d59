//! CSV annotation pass over harvested metadata files

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{error, info, instrument, warn};

use crate::annotate::error::AnnotateError;
use crate::annotate::retry::{RetryPolicy, Sleeper, classify_with_retry};
use crate::annotate::Classifier;

/// Header of the column receiving the category
pub const CATEGORY_HEADER: &str = "Category";

/// Category of rows lacking a title or an abstract
pub const MISSING_DATA: &str = "Missing Data";

/// Category of rows whose classification failed
pub const ERROR_CATEGORY: &str = "Error";

/// Fewer cells than this and a row cannot hold a title and an abstract
const MIN_ROW_CELLS: usize = 5;

const TITLE_COLUMN: (&str, usize) = ("Title", 2);
const ABSTRACT_COLUMN: (&str, usize) = ("Abstract", 4);

/// Counts of what an annotation pass did to one file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub path: PathBuf,
    pub classified: usize,
    pub missing: usize,
    pub errors: usize,
}

impl AnnotationSummary {
    /// Number of data rows in the file
    pub fn rows(&self) -> usize {
        self.classified + self.missing + self.errors
    }
}

fn column(header: &[String], (name, fallback): (&str, usize)) -> usize {
    header
        .iter()
        .position(|cell| cell.trim() == name)
        .unwrap_or(fallback)
}

fn set_cell(row: &mut Vec<String>, index: usize, value: &str) {
    if row.len() <= index {
        row.resize(index, String::new());
        row.push(value.to_string());
    } else {
        row[index] = value.to_string();
    }
}

/// Classify every row of a metadata file and rewrite it with a category column
///
/// The header gains a `Category` cell unless its last cell already is one, in
/// which case existing categories are overwritten. Rows without a title or an
/// abstract get `Missing Data` without calling the classifier; rows whose
/// classification fails get `Error`.
#[instrument(skip(classifier, sleeper, policy), fields(path = %path.display()))]
pub async fn annotate_csv<C, S>(
    path: &Path,
    classifier: &C,
    sleeper: &S,
    policy: &RetryPolicy,
) -> Result<AnnotationSummary, AnnotateError>
where
    C: Classifier,
    S: Sleeper,
{
    let content = fs::read(path).await?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_slice());
    let mut rows = Vec::new();
    for record in reader.records() {
        rows.push(record?.iter().map(str::to_string).collect::<Vec<_>>());
    }

    let Some(header) = rows.first_mut() else {
        return Err(AnnotateError::MissingHeader(path.to_path_buf()));
    };
    if header.last().map(String::as_str) != Some(CATEGORY_HEADER) {
        header.push(CATEGORY_HEADER.to_string());
    }
    let category_index = header.len() - 1;
    let title_index = column(header, TITLE_COLUMN);
    let abstract_index = column(header, ABSTRACT_COLUMN);

    let mut summary = AnnotationSummary {
        path: path.to_path_buf(),
        ..Default::default()
    };

    for (line, row) in rows.iter_mut().enumerate().skip(1) {
        let title = row.get(title_index).map(|s| s.trim()).unwrap_or_default();
        let abstract_text = row.get(abstract_index).map(|s| s.trim()).unwrap_or_default();

        let incomplete = row.len() < MIN_ROW_CELLS || title.is_empty() || abstract_text.is_empty();
        let category = if incomplete {
            summary.missing += 1;
            MISSING_DATA.to_string()
        } else {
            match classify_with_retry(classifier, sleeper, policy, title, abstract_text).await {
                Ok(category) => {
                    summary.classified += 1;
                    category
                }
                Err(e) => {
                    warn!("Error on row {}: {}", line + 1, e);
                    summary.errors += 1;
                    ERROR_CATEGORY.to_string()
                }
            }
        };
        set_cell(row, category_index, &category);
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());
    for row in &rows {
        writer.write_record(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AnnotateError::Io(e.into_error()))?;
    fs::write(path, bytes).await?;

    info!(
        "Annotation complete for {}: {} classified, {} missing, {} errors",
        path.display(),
        summary.classified,
        summary.missing,
        summary.errors
    );
    Ok(summary)
}

/// Annotate every `.csv` file of `dir` in name order
///
/// A file that cannot be processed is logged and skipped.
pub async fn annotate_dir<C, S>(
    dir: &Path,
    classifier: &C,
    sleeper: &S,
    policy: &RetryPolicy,
) -> Result<Vec<AnnotationSummary>, AnnotateError>
where
    C: Classifier,
    S: Sleeper,
{
    if !fs::metadata(dir).await.is_ok_and(|m| m.is_dir()) {
        return Err(AnnotateError::NotADirectory(dir.to_path_buf()));
    }

    let mut files = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "csv") {
            files.push(path);
        }
    }
    files.sort();

    let mut summaries = Vec::with_capacity(files.len());
    for file in files {
        match annotate_csv(&file, classifier, sleeper, policy).await {
            Ok(summary) => summaries.push(summary),
            Err(e) => error!("Error processing file {}: {}", file.display(), e),
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::error::ClassifyError;
    use crate::annotate::retry::testing::{RecordingSleeper, ScriptedClassifier};
    use tempfile::TempDir;

    const HEADER: &str = "Sr. No,Year,Title,Authors,Abstract,PDF Link\n";

    async fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    async fn read_rows(path: &Path) -> Vec<Vec<String>> {
        let content = fs::read(path).await.unwrap();
        csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_slice())
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[tokio::test]
    async fn test_annotate_appends_category_column() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}1,2023,Vision Paper,A,About images,https://x/a.pdf\n\
             2,2023,,B,Has no title,\n\
             3,2023,Broken Paper,C,Fails,\n",
            HEADER
        );
        let path = write(&dir, "NeurIPS_2023.csv", &content).await;

        let classifier = ScriptedClassifier::new(vec![
            Ok("Computer Vision".to_string()),
            Err(ClassifyError::Other("blocked".to_string())),
        ]);
        let sleeper = RecordingSleeper::default();
        let summary = annotate_csv(&path, &classifier, &sleeper, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(summary.classified, 1);
        assert_eq!(summary.missing, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.rows(), 3);

        let rows = read_rows(&path).await;
        assert_eq!(rows[0].last().unwrap(), CATEGORY_HEADER);
        assert_eq!(rows[1].last().unwrap(), "Computer Vision");
        assert_eq!(rows[2].last().unwrap(), MISSING_DATA);
        assert_eq!(rows[3].last().unwrap(), ERROR_CATEGORY);
        assert!(rows.iter().all(|r| r.len() == 7));

        // Row without a title never reaches the classifier
        assert_eq!(classifier.inputs().len(), 2);
    }

    #[tokio::test]
    async fn test_quota_row_is_retried_not_marked_error() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}1,2023,Title,A,Abstract text,\n", HEADER);
        let path = write(&dir, "NeurIPS_2023.csv", &content).await;

        let classifier = ScriptedClassifier::new(vec![
            Err(ClassifyError::from_message("Quota exceeded")),
            Ok("Optimization & Theory".to_string()),
        ]);
        let sleeper = RecordingSleeper::default();
        let summary = annotate_csv(&path, &classifier, &sleeper, &RetryPolicy::default())
            .await
            .unwrap();

        assert_eq!(summary.classified, 1);
        assert_eq!(summary.errors, 0);
        assert_eq!(sleeper.calls.lock().unwrap().len(), 1);
        assert_eq!(
            classifier.inputs(),
            vec![
                ("Title".to_string(), "Abstract text".to_string()),
                ("Title".to_string(), "Abstract text".to_string())
            ]
        );
        assert_eq!(read_rows(&path).await[1][6], "Optimization & Theory");
    }

    #[tokio::test]
    async fn test_second_pass_overwrites_existing_category() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}1,2023,Title,A,Abstract,\n", HEADER);
        let path = write(&dir, "NeurIPS_2023.csv", &content).await;
        let sleeper = RecordingSleeper::default();
        let policy = RetryPolicy::default();

        let first = ScriptedClassifier::new(vec![Ok("Deep Learning".to_string())]);
        annotate_csv(&path, &first, &sleeper, &policy).await.unwrap();
        let second = ScriptedClassifier::new(vec![Ok("Reinforcement Learning".to_string())]);
        annotate_csv(&path, &second, &sleeper, &policy).await.unwrap();

        let rows = read_rows(&path).await;
        assert_eq!(rows[0].len(), 7);
        assert_eq!(
            rows[1],
            vec!["1", "2023", "Title", "A", "Abstract", "", "Reinforcement Learning"]
        );
    }

    #[tokio::test]
    async fn test_short_rows_are_missing_data() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "short.csv", &format!("{}1,2023,Title\n", HEADER)).await;

        let classifier = ScriptedClassifier::default();
        let summary = annotate_csv(
            &path,
            &classifier,
            &RecordingSleeper::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        assert_eq!(summary.missing, 1);
        assert!(classifier.inputs().is_empty());
        let rows = read_rows(&path).await;
        assert_eq!(rows[1][6], MISSING_DATA);
    }

    #[tokio::test]
    async fn test_empty_file_has_no_header() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty.csv", "").await;

        let err = annotate_csv(
            &path,
            &ScriptedClassifier::default(),
            &RecordingSleeper::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnnotateError::MissingHeader(_)));
    }

    #[tokio::test]
    async fn test_annotate_dir_processes_csv_files_in_order() {
        let dir = TempDir::new().unwrap();
        write(&dir, "NeurIPS_2023.csv", &format!("{}1,2023,B,A,Abs,\n", HEADER)).await;
        write(&dir, "NeurIPS_2022.csv", &format!("{}1,2022,A,A,Abs,\n", HEADER)).await;
        write(&dir, "empty.csv", "").await;
        write(&dir, "notes.txt", "not a csv").await;

        let classifier = ScriptedClassifier::default();
        let summaries = annotate_dir(
            dir.path(),
            &classifier,
            &RecordingSleeper::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap();

        let names: Vec<_> = summaries
            .iter()
            .map(|s| s.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["NeurIPS_2022.csv", "NeurIPS_2023.csv"]);
        let titles: Vec<_> = classifier.inputs().into_iter().map(|(t, _)| t).collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert_eq!(fs::read_to_string(dir.path().join("notes.txt")).await.unwrap(), "not a csv");
    }

    #[tokio::test]
    async fn test_annotate_dir_requires_directory() {
        let dir = TempDir::new().unwrap();
        let err = annotate_dir(
            &dir.path().join("missing"),
            &ScriptedClassifier::default(),
            &RecordingSleeper::default(),
            &RetryPolicy::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AnnotateError::NotADirectory(_)));
    }
}
