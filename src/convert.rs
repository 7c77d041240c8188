//! Markdown to chapter XHTML.
//!
//! Converts a note body with CommonMark plus the usual extensions (tables,
//! footnotes, strikethrough, task lists) and wraps it in a minimal XHTML page
//! with the note title as heading. Each chapter is converted on its own.
//!
//! The page shell is built with [Maud](https://maud.lambda.xyz/), so titles
//! are escaped. pulldown-cmark emits self-closing void tags (`<img />`,
//! `<br />`) for markdown constructs. Raw HTML in a note (`<br>`, `<img>`)
//! is not XML, so it is rendered as escaped text. Chapters stay well-formed
//! and the only images in them are the ones the resolver rewrote.

use crate::types::{Chapter, Document};
use maud::{Markup, PreEscaped, html};
use pulldown_cmark::{Event, Options, Parser, html as md_html};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;
const XHTML_DOCTYPE: &str = "<!DOCTYPE html>";
const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

const CHAPTER_CSS: &str = "\
body { font-family: serif; line-height: 1.5; margin: 0 5%; }
h1 { font-size: 1.6em; margin: 1em 0; }
img { max-width: 100%; height: auto; }
pre, code { font-family: monospace; white-space: pre-wrap; }
table { border-collapse: collapse; }
td, th { border: 1px solid #999; padding: 0.2em 0.4em; }
blockquote { margin-left: 1em; padding-left: 1em; border-left: 3px solid #ccc; }";

/// Markdown extensions enabled for notes.
pub fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Convert markdown to an XHTML fragment. Raw HTML becomes text.
pub fn markdown_to_html(body: &str) -> String {
    let parser = Parser::new_ext(body, markdown_options()).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        other => other,
    });
    let mut out = String::new();
    md_html::push_html(&mut out, parser);
    out
}

/// Complete chapter page for `title` and a markdown `body`.
pub fn to_xhtml(title: &str, language: &str, body: &str) -> String {
    let language = html! { (language) }.into_string();
    let content = chapter_content(title, &markdown_to_html(body)).into_string();
    format!(
        "{XML_DECLARATION}\n{XHTML_DOCTYPE}\n\
         <html xmlns=\"{XHTML_NAMESPACE}\" lang=\"{language}\" xml:lang=\"{language}\">\
         {content}</html>"
    )
}

/// Build the chapter for a document whose images are already resolved.
pub fn to_chapter(
    document: &Document,
    resolved_body: &str,
    ordinal: usize,
    language: &str,
) -> Chapter {
    let title = document.title();
    let markup = to_xhtml(&title, language, resolved_body);
    Chapter {
        title,
        ordinal,
        markup,
    }
}

/// `head` and `body` of a chapter page. The `html` element is written by
/// hand because it needs the namespaced `xml:lang` attribute.
fn chapter_content(title: &str, body_html: &str) -> Markup {
    html! {
        head {
            title { (title) }
            style type="text/css" { (PreEscaped(CHAPTER_CSS)) }
        }
        body {
            h1 { (title) }
            (PreEscaped(body_html))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::dated_doc;
    use quick_xml::Reader;
    use quick_xml::events::Event as XmlEvent;

    /// Parse `page` as XML, returning the names of all elements.
    fn xml_elements(page: &str) -> Vec<String> {
        let mut reader = Reader::from_str(page);
        let mut names = Vec::new();
        loop {
            match reader.read_event() {
                Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => {
                    names.push(String::from_utf8_lossy(e.name().as_ref()).to_string());
                }
                Ok(XmlEvent::Eof) => break,
                Ok(_) => {}
                Err(e) => panic!("not well-formed: {e}\n{page}"),
            }
        }
        names
    }

    #[test]
    fn converts_basic_markdown() {
        let html = markdown_to_html("# Heading\n\nSome *emphasis*.");
        assert!(html.contains("<h1>Heading</h1>"));
        assert!(html.contains("<em>emphasis</em>"));
    }

    #[test]
    fn converts_tables() {
        let html = markdown_to_html("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert!(html.contains("<table>"));
        assert!(html.contains("<td>1</td>"));
    }

    #[test]
    fn converts_strikethrough_and_tasks() {
        let html = markdown_to_html("~~gone~~\n\n- [x] done\n");
        assert!(html.contains("<del>gone</del>"));
        assert!(html.contains(r#"type="checkbox""#));
    }

    #[test]
    fn converts_footnotes() {
        let html = markdown_to_html("Claim[^1].\n\n[^1]: Source.\n");
        assert!(html.contains("footnote-definition"));
    }

    #[test]
    fn image_tags_are_self_closing() {
        let html = markdown_to_html("![cat](images/abc.png)");
        assert!(html.contains(r#"<img src="images/abc.png" alt="cat" />"#));
    }

    #[test]
    fn page_has_xml_prolog_and_namespace() {
        let page = to_xhtml("T", "gl", "x");
        assert!(page.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(page.contains("<!DOCTYPE html>"));
        assert!(page.contains(r#"xmlns="http://www.w3.org/1999/xhtml""#));
        assert!(page.contains(r#"xml:lang="gl""#));
    }

    #[test]
    fn page_carries_title_heading() {
        let page = to_xhtml("Morning pages", "gl", "Body text");
        assert!(page.contains("<title>Morning pages</title>"));
        assert!(page.contains("<h1>Morning pages</h1>"));
        assert!(page.contains("<p>Body text</p>"));
    }

    #[test]
    fn title_is_escaped() {
        let page = to_xhtml("Fish & <Chips>", "gl", "");
        assert!(page.contains("<h1>Fish &amp; &lt;Chips&gt;</h1>"));
    }

    #[test]
    fn raw_html_is_escaped_text() {
        let html = markdown_to_html("line one<br>line two\n\n<img src=\"http://x/a.png\">\n");
        assert!(html.contains("line one&lt;br&gt;line two"));
        assert!(html.contains("&lt;img src=&quot;http://x/a.png&quot;&gt;"));
        assert!(!html.contains("<img"));
    }

    #[test]
    fn pages_are_well_formed_xml() {
        let bodies = [
            "line one<br>line two\n\n<img src=\"http://x/a.png\">",
            "<div>\n<p>unclosed\n</div>\n\n<hr>",
            "| a | b |\n|---|---|\n| 1 | 2 |\n\n- [x] done\n\nClaim[^1].\n\n[^1]: Source.",
            "![cat](images/abc.png)\n\n---\n\nline  \nbreak & <stuff>",
        ];
        for body in bodies {
            let elements = xml_elements(&to_xhtml("Fish & Chips", "gl", body));
            assert!(elements.contains(&"body".to_string()));
        }
    }

    #[test]
    fn only_markdown_images_become_img_elements() {
        let page = to_xhtml("T", "gl", "![cat](images/abc.png) <img src=\"http://x/a.png\">");
        let imgs = xml_elements(&page).iter().filter(|n| *n == "img").count();
        assert_eq!(imgs, 1);
    }

    #[test]
    fn chapter_uses_document_title_and_ordinal() {
        let doc = dated_doc("notes/walk.md", "2024-01-01");
        let chapter = to_chapter(&doc, "Hello", 2, "gl");
        assert_eq!(chapter.title, "walk");
        assert_eq!(chapter.ordinal, 2);
        assert!(chapter.markup.contains("<p>Hello</p>"));
    }
}
