//! `folio book ...`: one-off orchestrated lookups.

use anyhow::Context;
use console::style;

use crate::app::AppServices;
use crate::cli::helpers::{field, heading, print_lookup};
use crate::models::{GenerationRequest, PublicDomainQuery, ResolutionQuery, UnitKey};

pub async fn cmd_resolve(
    services: &AppServices,
    title: String,
    author: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = services.context();
    let query = ResolutionQuery::new(title, author);
    let result = services.books.resolve_isbn(&query, &ctx).await;
    print_lookup(&result, json, "ISBN", |r| {
        println!("{} {}", style(&r.isbn).green().bold(), r.title);
        if !r.authors.is_empty() {
            field("authors", Some(&r.authors.join(", ")));
        }
        field("source", Some(&format!("{} ({})", r.source, r.confidence)));
    })
}

pub async fn cmd_enrich(services: &AppServices, isbn: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.enrich_metadata(isbn, &ctx).await;
    print_lookup(&result, json, "metadata", |merged| {
        let m = &merged.metadata;
        heading(m.title.as_deref().unwrap_or(&m.isbn));
        field("isbn", Some(&m.isbn));
        field("subtitle", m.subtitle.as_deref());
        if !m.authors.is_empty() {
            field("authors", Some(&m.authors.join(", ")));
        }
        field("publisher", m.publisher.as_deref());
        field("published", m.published_date.as_deref());
        field("pages", m.page_count.map(|p| p.to_string()).as_deref());
        field("language", m.language.as_deref());
        if !m.subjects.is_empty() {
            field("subjects", Some(&m.subjects.join(", ")));
        }
        field("cover", m.cover_url.as_deref());
        field("sources", Some(&merged.sources.join(", ")));
    })
}

pub async fn cmd_cover(services: &AppServices, isbn: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.fetch_cover(isbn, &ctx).await;
    print_lookup(&result, json, "cover", |c| {
        println!("{}", c.url);
        field("size", c.size.as_deref());
        field("source", Some(&c.source));
    })
}

pub async fn cmd_ratings(services: &AppServices, isbn: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.fetch_ratings(isbn, &ctx).await;
    print_lookup(&result, json, "ratings", |r| {
        println!("{:.2} from {} ratings ({})", r.average, r.count, r.source);
    })
}

pub async fn cmd_public_domain(
    services: &AppServices,
    title: String,
    author: Option<String>,
    isbn: Option<String>,
    year: Option<i32>,
    json: bool,
) -> anyhow::Result<()> {
    let ctx = services.context();
    let query = PublicDomainQuery {
        isbn,
        title,
        author,
        publication_year: year,
    };
    let result = services.books.detect_public_domain(&query, &ctx).await;
    print_lookup(&result, json, "public domain determination", |r| {
        let verdict = if r.is_public_domain {
            style("public domain").green()
        } else {
            style("in copyright").yellow()
        };
        println!("{}: {}", verdict, r.reason);
        field("download", r.download_url.as_deref());
        field("source", Some(&r.source));
    })
}

pub async fn cmd_ids(services: &AppServices, isbn: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.aggregate_external_ids(isbn, &ctx).await;
    print_lookup(&result, json, "external identifiers", |merged| {
        for (catalog, id) in &merged.ids {
            let source = merged.provenance.get(catalog).map(String::as_str).unwrap_or("");
            println!("  {:<14} {:<24} {}", catalog, id, style(source).dim());
        }
    })
}

pub async fn cmd_editions(services: &AppServices, isbn: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.edition_variants(isbn, &ctx).await;
    print_lookup(&result, json, "editions", |editions| {
        for e in editions {
            println!(
                "  {}  {:<12} {}",
                e.isbn,
                e.format.as_deref().unwrap_or("-"),
                e.publisher.as_deref().unwrap_or("")
            );
        }
    })
}

pub async fn cmd_author(services: &AppServices, name: &str, json: bool) -> anyhow::Result<()> {
    let ctx = services.context();
    let result = services.books.author_biography(name, &ctx).await;
    print_lookup(&result, json, "biography", |bio| {
        heading(&bio.name);
        field("born", bio.birth_date.as_deref());
        field("died", bio.death_date.as_deref());
        println!("\n{}", bio.biography);
        field("source", Some(&bio.source));
    })
}

pub async fn cmd_generate(
    services: &AppServices,
    month: &str,
    count: Option<usize>,
    json: bool,
) -> anyhow::Result<()> {
    let key = UnitKey::parse(month).with_context(|| format!("expected YYYY-MM, got '{month}'"))?;
    let ctx = services.context();
    let request = GenerationRequest {
        year: key.year,
        month: key.month,
        count: count.unwrap_or(services.settings.llm.books_per_month),
    };
    let result = services.books.generate_books(&request, &ctx).await;
    print_lookup(&result, json, "generated books", |outcome| {
        heading(&format!("Notable books for {}", key));
        for book in &outcome.books {
            println!(
                "  {} {}",
                style(&book.title).bold(),
                book.author.as_deref().map(|a| format!("by {a}")).unwrap_or_default()
            );
        }
        println!(
            "\n{} unique, {} duplicates removed",
            outcome.books.len(),
            outcome.duplicates_removed
        );
        if !outcome.failed_providers.is_empty() {
            println!(
                "{} failed: {}",
                style("!").yellow(),
                outcome.failed_providers.join(", ")
            );
        }
    })
}
