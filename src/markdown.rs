/// HTML to Markdown conversion, treated as a black box by the import pipeline.
pub trait MarkdownConverter {
    fn convert(&self, html: &str) -> String;
}

/// Converter backed by the `html2md` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct Html2MdConverter;

impl MarkdownConverter for Html2MdConverter {
    fn convert(&self, html: &str) -> String {
        html2md::parse_html(html)
    }
}

/// Normalize converter output: trailing spaces, runs of blank lines, final newline.
pub fn clean_markdown(md: &str) -> String {
    let mut result = md
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    // Collapse 3+ consecutive newlines to 2
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    let trimmed = result.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}\n", trimmed)
    }
}
