//! End-to-end conversion: source document → cleaned content → chapters → EPUB.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};
use url::Url;

use pagebinder_document::{
    CleanOptions, ImageLoader, clean_document, extract_main_content, extract_metadata,
    reduce_heading_levels, render_chapters, split_chapters,
};
use pagebinder_graph::{BoxError, Stage, StageGraph, StageReporter};
use pagebinder_shared::{
    AppConfig, BookMetadata, BookResult, Chapter, ChapterDocument, ImageAssets, ImageOptions,
    Result, SourceDocument,
};

use crate::source::load_source;

/// Settings for one conversion, merged from config file and CLI flags.
#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Directory the book directory is created in.
    pub output_dir: PathBuf,
    /// Language used when the document declares none.
    pub default_language: String,
    /// Overrides the extracted title.
    pub title: Option<String>,
    /// Overrides the extracted language.
    pub language: Option<String>,
    pub images: ImageOptions,
    pub clean: CleanOptions,
}

impl ConvertConfig {
    /// Defaults from the application config; flags are applied by the caller.
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            output_dir: PathBuf::from(&config.defaults.output_dir),
            default_language: config.defaults.language.clone(),
            title: None,
            language: None,
            images: ImageOptions::from(&config.images),
            clean: CleanOptions::from(&config.clean),
        }
    }
}

/// Load `input` and convert it.
pub async fn convert(
    input: &str,
    config: &ConvertConfig,
    reporter: Arc<dyn StageReporter>,
) -> Result<BookResult> {
    let source = load_source(input).await?;
    convert_document(source, config, reporter).await
}

/// Convert a loaded document into an EPUB book directory.
///
/// Every step is a stage of one [`StageGraph`]; independent branches
/// (metadata, image loading, chapter splitting) run concurrently and the
/// book stage is resolved last.
#[instrument(skip_all, fields(url = %source.url))]
pub async fn convert_document(
    source: SourceDocument,
    config: &ConvertConfig,
    reporter: Arc<dyn StageReporter>,
) -> Result<BookResult> {
    let start = Instant::now();
    info!(output_dir = %config.output_dir.display(), "starting conversion");

    let loader = Arc::new(ImageLoader::new(config.images.clone())?);
    let mut graph = StageGraph::with_reporter(reporter.clone());

    let document = graph.add_step(Stage::constant(source.html), &[])?;
    let url = graph.add_step(Stage::constant(source.url), &[])?;

    let clean = config.clean.clone();
    let cleaned = graph.add_step(
        Stage::deferred("Cleaning HTML document", move |inputs| {
            let html = inputs.cloned::<String>(0);
            let options = clean.clone();
            let reporter = reporter.clone();
            async move { Ok::<_, BoxError>(clean_document(html?, options, reporter).await?) }
        }),
        &[document.id()],
    )?;

    let headings = graph.add_step(
        Stage::new("Reducing heading levels", |inputs| {
            Ok(reduce_heading_levels(inputs.get::<String>(0)?))
        }),
        &[cleaned.id()],
    )?;

    let default_language = config.default_language.clone();
    let title = config.title.clone();
    let language = config.language.clone();
    let metadata = graph.add_step(
        Stage::new("Extracting metadata", move |inputs| {
            let mut metadata =
                extract_metadata(inputs.get::<String>(0)?, inputs.get::<Url>(1)?, &default_language);
            if let Some(title) = &title {
                metadata.title = title.clone();
            }
            if let Some(language) = &language {
                metadata.language = language.clone();
            }
            Ok(metadata)
        }),
        &[document.id(), url.id()],
    )?;

    let main = graph.add_step(
        Stage::new("Extracting main content", |inputs| {
            Ok(extract_main_content(inputs.get::<String>(0)?))
        }),
        &[headings.id()],
    )?;

    let images = graph.add_step(
        Stage::deferred("Loading images", move |inputs| {
            let loader = loader.clone();
            let html = inputs.cloned::<String>(0);
            let base = inputs.cloned::<Url>(1);
            async move {
                let (html, base) = (html?, base?);
                Ok::<_, BoxError>(loader.load(&html, &base).await)
            }
        }),
        &[main.id(), url.id()],
    )?;

    let chapters = graph.add_step(
        Stage::new("Splitting content by headings", |inputs| {
            let metadata = inputs.get::<BookMetadata>(1)?;
            Ok(split_chapters(inputs.get::<String>(0)?, &metadata.title))
        }),
        &[main.id(), metadata.id()],
    )?;

    let rendered = graph.add_step(
        Stage::new("Rendering chapters", |inputs| {
            Ok(render_chapters(inputs.get::<Vec<Chapter>>(0)?))
        }),
        &[chapters.id()],
    )?;

    let output_dir = config.output_dir.clone();
    graph.add_step(
        Stage::new("Creating EPUB", move |inputs| {
            Ok(pagebinder_epub::write_book(
                &output_dir,
                inputs.get::<BookMetadata>(1)?,
                inputs.get::<Vec<ChapterDocument>>(0)?,
                inputs.get::<ImageAssets>(2)?,
            )?)
        }),
        &[rendered.id(), metadata.id(), images.id()],
    )?;

    let book = graph.process_as::<BookResult>().await?;
    let book = Arc::unwrap_or_clone(book);

    info!(
        path = %book.path.display(),
        chapters = book.chapter_count,
        images = book.image_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "conversion complete"
    );
    Ok(book)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pagebinder_graph::{GraphError, SilentReporter, StagePhase};
    use pagebinder_shared::PagebinderError;

    use super::*;

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 9, 9];

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pb-pipeline-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config(output_dir: PathBuf) -> ConvertConfig {
        ConvertConfig {
            output_dir,
            ..ConvertConfig::from_app_config(&AppConfig::default())
        }
    }

    fn source(dir: &std::path::Path, html: &str) -> SourceDocument {
        let path = dir.join("article.html");
        std::fs::write(&path, html).unwrap();
        SourceDocument {
            html: html.to_string(),
            url: Url::from_file_path(&path).unwrap(),
        }
    }

    const ARTICLE: &str = r#"<html lang="en"><head>
        <title>Site | Guide</title>
        <meta property="og:title" content="The Guide">
        <meta name="author" content="Ada">
        </head><body>
        <nav><a href="/">Home</a></nav>
        <article>
          <h2>The Guide</h2><p>Welcome.</p>
          <h3>Setup</h3><p>Install <img src="fig.png" alt="figure"> it.</p><script>track()</script>
          <h3>Usage</h3><p>Run   it.</p><img src="missing.png">
        </article>
        <footer>footer</footer>
        </body></html>"#;

    #[tokio::test]
    async fn converts_a_local_article() {
        let tmp = temp_dir();
        std::fs::write(tmp.join("fig.png"), PNG).unwrap();
        let out = tmp.join("books");

        let book = convert_document(source(&tmp, ARTICLE), &config(out.clone()), Arc::new(SilentReporter))
            .await
            .unwrap();

        assert_eq!(book.title, "The Guide");
        assert_eq!(book.path, out.join("the-guide"));
        assert_eq!(book.chapter_count, 3);
        assert_eq!(book.image_count, 1);
        assert!(pagebinder_epub::validate_book(&book.path).is_ok());

        let setup = std::fs::read_to_string(book.path.join("OEBPS/text/chapter-002.xhtml")).unwrap();
        assert!(setup.contains("<h2>Setup</h2>"));
        assert!(setup.contains(r#"src="../images/"#));
        assert!(!setup.contains("track()"));

        let usage = std::fs::read_to_string(book.path.join("OEBPS/text/chapter-003.xhtml")).unwrap();
        assert!(usage.contains("Run it."));
        assert!(!usage.contains("missing.png"));

        let opf = std::fs::read_to_string(book.path.join("OEBPS/content.opf")).unwrap();
        assert!(opf.contains("<dc:creator>Ada</dc:creator>"));

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn overrides_apply_and_stages_report_in_dependency_order() {
        let tmp = temp_dir();
        let started = Arc::new(Mutex::new(Vec::new()));
        let sink = started.clone();
        let reporter = Arc::new(move |description: Option<&str>, phase: StagePhase| {
            if let (Some(description), StagePhase::Started) = (description, phase) {
                sink.lock().unwrap().push(description.to_string());
            }
        });

        let mut config = config(tmp.join("books"));
        config.title = Some("Custom".into());
        config.language = Some("fr".into());
        config.images.enabled = false;

        let book = convert_document(source(&tmp, ARTICLE), &config, reporter)
            .await
            .unwrap();
        assert_eq!(book.title, "Custom");
        assert_eq!(book.image_count, 0);
        let opf = std::fs::read_to_string(book.path.join("OEBPS/content.opf")).unwrap();
        assert!(opf.contains("<dc:language>fr</dc:language>"));

        let started = started.lock().unwrap();
        let position = |name: &str| started.iter().position(|s| s == name).unwrap();
        assert!(position("Cleaning HTML document") < position("Removing comments"));
        assert!(position("Removing extra whitespace") < position("Reducing heading levels"));
        assert!(position("Extracting main content") < position("Loading images"));
        assert!(position("Rendering chapters") < position("Creating EPUB"));
        assert_eq!(started.last().map(String::as_str), Some("Creating EPUB"));
        assert_eq!(
            started.iter().filter(|s| *s == "Extracting metadata").count(),
            1
        );

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn empty_documents_fail_in_the_book_stage() {
        let tmp = temp_dir();
        let err = convert_document(
            source(&tmp, "<html><body><nav>only chrome</nav></body></html>"),
            &config(tmp.join("books")),
            Arc::new(SilentReporter),
        )
        .await
        .unwrap_err();

        match err {
            PagebinderError::Pipeline(GraphError::StageExecution(e)) => {
                assert_eq!(e.description.as_deref(), Some("Creating EPUB"));
                assert!(e.to_string().contains("no chapters"));
            }
            other => panic!("unexpected error: {other}"),
        }

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
