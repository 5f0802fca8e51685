use clap::Subcommand;
use color_eyre::{Section, eyre};
use quire::{
    pagination::PageRequest,
    search::{SearchMode, SearchRequest},
    service::Period,
    types::ArticleStatus,
};

use crate::{Context, article::print_page};

#[derive(Subcommand)]
pub enum ReportCommands {
    /// Full-text search over articles
    Search {
        query: String,
        /// Require every word to match
        #[arg(long)]
        boolean: bool,
        #[arg(long)]
        status: Option<ArticleStatus>,
        #[arg(long)]
        category: Option<u64>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Categories and tags whose name contains the text
    Suggest {
        partial: String,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Most engaging published articles
    Popular {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Recently published articles ranked by decayed engagement
    Trending {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        /// Window in days; 0 uses the configured window
        #[arg(short, long, default_value_t = 0)]
        days: u32,
    },
    /// Engagement grouped by publication period
    Periods {
        #[arg(default_value = "monthly")]
        period: Period,
        #[arg(short, long, default_value_t = 0)]
        limit: usize,
    },
    /// Totals across one author's articles
    Author { id: u64 },
    /// Published articles by year and month
    History {
        /// Only print the summary numbers
        #[arg(long)]
        stats: bool,
        /// List the articles of one month, e.g. `2024 3`
        #[arg(num_args = 2, value_names = ["YEAR", "MONTH"])]
        month: Option<Vec<i32>>,
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

pub fn handle_report_command(context: &Context<'_>, command: ReportCommands) -> eyre::Result<()> {
    let blog = context.blog;
    match command {
        ReportCommands::Search {
            query,
            boolean,
            status,
            category,
            page,
            limit,
        } => {
            let request = SearchRequest {
                status,
                category_id: category,
                mode: if boolean {
                    SearchMode::Boolean
                } else {
                    SearchMode::Natural
                },
                ..SearchRequest::new(query)
            };
            let response = blog
                .searcher()
                .search(&request, PageRequest::new(page, limit)?)
                .note("Failed to search articles")?;
            context.emit(&response, |response| {
                if response.articles.is_empty() {
                    println!("No results for \"{}\"", response.query);
                    if !response.suggestions.is_empty() {
                        println!("Try: {}", response.suggestions.join(", "));
                    }
                    return;
                }
                println!("Found {} result(s) in {}ms:", response.total, response.search_time_ms);
                for hit in &response.articles {
                    println!("• {} /{} ({:.2})", hit.item.title, hit.item.slug, hit.score);
                }
            })
        }
        ReportCommands::Suggest { partial, limit } => {
            let terms = blog.searcher().suggest_terms(&partial, limit)?;
            context.emit(&terms, |terms| {
                for term in terms {
                    println!("{}: {}", term.term, term.description);
                }
            })
        }
        ReportCommands::Popular { limit } => {
            let ranked = blog.statistics().popular(limit)?;
            context.emit(&ranked, |ranked| {
                for (rank, entry) in ranked.iter().enumerate() {
                    println!("{}. {} ({})", rank + 1, entry.item.title, entry.score);
                }
            })
        }
        ReportCommands::Trending { limit, days } => {
            let ranked = blog.statistics().trending(limit, days)?;
            context.emit(&ranked, |ranked| {
                for (rank, entry) in ranked.iter().enumerate() {
                    println!("{}. {} ({:.1})", rank + 1, entry.item.title, entry.score);
                }
            })
        }
        ReportCommands::Periods { period, limit } => {
            let stats = blog.statistics().period_stats(period, limit)?;
            context.emit(&stats, |stats| {
                for entry in stats {
                    println!(
                        "{}: {} article(s), {} view(s), {} like(s), {} comment(s)",
                        entry.period,
                        entry.totals.article_count,
                        entry.totals.total_views,
                        entry.totals.total_likes,
                        entry.totals.total_comments
                    );
                }
            })
        }
        ReportCommands::Author { id } => {
            let summary = blog.statistics().author_summary(id)?;
            context.emit(&summary, |summary| {
                println!(
                    "{} article(s), {} view(s), {} like(s), {} comment(s)",
                    summary.totals.article_count,
                    summary.totals.total_views,
                    summary.totals.total_likes,
                    summary.totals.total_comments
                );
            })
        }
        ReportCommands::History { stats, month, page } => {
            if let Some([year, month]) = month.as_deref() {
                let month = u8::try_from(*month)
                    .map_err(|_| eyre::eyre!("month must be between 1 and 12"))?;
                let articles = blog.archive().articles_in_month(
                    *year,
                    month,
                    PageRequest::new(page, context.blog.config().page_size())?,
                )?;
                return context.emit(&articles, print_page);
            }
            if stats {
                let statistics = blog.archive().statistics()?;
                return context.emit(&statistics, |statistics| {
                    println!(
                        "{} article(s) over {} year(s) and {} month(s)",
                        statistics.total_articles, statistics.total_years, statistics.total_months
                    );
                    if let Some(year) = &statistics.most_active_year {
                        println!("busiest year: {} ({})", year.year, year.count);
                    }
                    if let Some(month) = &statistics.most_active_month {
                        println!("busiest month: {} {} ({})", month.month_name, month.year, month.count);
                    }
                });
            }
            let report = blog.archive().report()?;
            context.emit(&report, |report| {
                for year in &report.years {
                    println!("{} ({})", year.year, year.total);
                    for month in &year.months {
                        println!("  {} ({})", month.month_name, month.count);
                    }
                }
            })
        }
    }
}
