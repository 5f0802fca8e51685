use std::path::PathBuf;

use clap::Subcommand;
use color_eyre::{Section, eyre};
use quire::{
    pagination::{Page, PageRequest},
    service::{CreateArticle, UpdateArticle},
    types::{Article, ArticleFilter, ArticleStatus, CommentThread},
};
use tracing::info;

use crate::Context;

#[derive(Subcommand)]
pub enum ArticleCommands {
    /// Write a new article as the token's owner
    Create {
        title: String,
        /// Article body; read from --file when omitted
        #[arg(short, long)]
        content: Option<String>,
        #[arg(short, long, conflicts_with = "content")]
        file: Option<PathBuf>,
        #[arg(short, long, default_value = "")]
        excerpt: String,
        #[arg(long)]
        category: Option<u64>,
        /// Repeat for several tags
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Publish right away instead of saving a draft
        #[arg(long)]
        publish: bool,
    },
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        excerpt: Option<String>,
        /// Category id; 0 removes the category
        #[arg(long)]
        category: Option<u64>,
        /// Replace the tag list; repeat for several tags
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    Publish { id: u64 },
    Unpublish { id: u64 },
    Archive { id: u64 },
    Delete { id: u64 },
    /// Show an article by slug and count a view
    Show { slug: String },
    List {
        #[arg(long)]
        status: Option<ArticleStatus>,
        #[arg(long)]
        author: Option<u64>,
        #[arg(long)]
        category: Option<u64>,
        #[arg(long)]
        tag: Option<u64>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Like an article, or take the like back
    Like { id: u64 },
    /// Article engagement counters
    Stats { id: u64 },
}

#[derive(Subcommand)]
pub enum CommentCommands {
    Add {
        article: u64,
        content: String,
        #[arg(long)]
        reply_to: Option<u64>,
    },
    /// Print the comment threads of an article
    List { article: u64 },
    Delete { id: u64 },
}

pub fn handle_article_command(context: &Context<'_>, command: ArticleCommands) -> eyre::Result<()> {
    let articles = context.blog.articles();
    match command {
        ArticleCommands::Create {
            title,
            content,
            file,
            excerpt,
            category,
            tags,
            publish,
        } => {
            let author = context.user_id()?;
            let content = match (content, file) {
                (Some(content), _) => content,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .note(format!("Can't read {}", file.display()))?,
                (None, None) => {
                    return Err(eyre::eyre!("Article has no content"))
                        .suggestion("Pass --content or --file");
                }
            };
            let article = articles
                .create(
                    author,
                    &CreateArticle {
                        title,
                        content,
                        excerpt,
                        category_id: category,
                        tag_names: tags,
                        status: publish.then_some(ArticleStatus::Published),
                    },
                )
                .note("Failed to create article")?;
            context.emit(&article, print_article)
        }
        ArticleCommands::Edit {
            id,
            title,
            content,
            excerpt,
            category,
            tags,
        } => {
            let author = context.user_id()?;
            let changes = UpdateArticle {
                title,
                content,
                excerpt,
                category_id: category.map(|id| (id != 0).then_some(id)),
                tag_names: tags,
                status: None,
            };
            let article = articles.update(id, author, &changes).note("Failed to update article")?;
            context.emit(&article, print_article)
        }
        ArticleCommands::Publish { id } => {
            let article = articles.publish(id, context.user_id()?)?;
            context.emit(&article, print_article)
        }
        ArticleCommands::Unpublish { id } => {
            let article = articles.unpublish(id, context.user_id()?)?;
            context.emit(&article, print_article)
        }
        ArticleCommands::Archive { id } => {
            let article = articles.archive(id, context.user_id()?)?;
            context.emit(&article, print_article)
        }
        ArticleCommands::Delete { id } => {
            articles.delete(id, context.user_id()?)?;
            info!(id, "Article deleted");
            Ok(())
        }
        ArticleCommands::Show { slug } => {
            let article = articles.get_by_slug(&slug)?;
            articles.record_view(article.id)?;
            let detail = articles.detail(article.id)?;
            context.emit(&detail, |detail| {
                print_article(&detail.article);
                println!("by {}", detail.author.username);
                if let Some(category) = &detail.category {
                    println!("in {}", category.name);
                }
                if !detail.tags.is_empty() {
                    let names: Vec<_> = detail.tags.iter().map(|tag| tag.name.as_str()).collect();
                    println!("tags: {}", names.join(", "));
                }
                println!();
                println!("{}", detail.article.content);
            })
        }
        ArticleCommands::List {
            status,
            author,
            category,
            tag,
            page,
            limit,
        } => {
            let filter = ArticleFilter {
                status,
                author_id: author,
                category_id: category,
                tag_id: tag,
                ..ArticleFilter::default()
            };
            let listed = articles.list(&filter, PageRequest::new(page, limit)?)?;
            context.emit(&listed, print_page)
        }
        ArticleCommands::Like { id } => {
            let user = context.user_id()?;
            context.blog.likes().toggle(user, id)?;
            let status = context.blog.likes().status(id, Some(user))?;
            context.emit(&status, |status| {
                let verb = if status.liked { "Liked" } else { "Unliked" };
                println!("{verb} #{}, {} like(s)", status.article_id, status.count);
            })
        }
        ArticleCommands::Stats { id } => {
            let stats = context.blog.statistics().article_stats(id)?;
            context.emit(&stats, |stats| {
                println!(
                    "{}: {} view(s), {} like(s), {} comment(s)",
                    stats.title, stats.view_count, stats.like_count, stats.comment_count
                );
            })
        }
    }
}

pub fn handle_comment_command(context: &Context<'_>, command: CommentCommands) -> eyre::Result<()> {
    let comments = context.blog.comments();
    match command {
        CommentCommands::Add {
            article,
            content,
            reply_to,
        } => {
            let comment = comments
                .create(context.user_id()?, article, &content, reply_to)
                .note("Failed to post comment")?;
            context.emit(&comment, |comment| println!("Posted comment #{}", comment.id))
        }
        CommentCommands::List { article } => {
            let threads = comments.threads(article)?;
            context.emit(&threads, |threads| print_threads(threads, 0))
        }
        CommentCommands::Delete { id } => {
            comments.delete(id, context.user_id()?)?;
            info!(id, "Comment deleted");
            Ok(())
        }
    }
}

pub fn print_article(article: &Article) {
    println!("#{} {} [{}] /{}", article.id, article.title, article.status, article.slug);
}

pub fn print_page(page: &Page<Article>) {
    if page.items.is_empty() {
        println!("No articles");
        return;
    }
    for article in &page.items {
        print_article(article);
    }
    println!("page {} of {} ({} total)", page.page, page.total_pages(), page.total);
}

fn print_threads(threads: &[CommentThread], depth: usize) {
    for thread in threads {
        let author = thread
            .author
            .as_ref()
            .map_or("[deleted]", |author| author.username.as_str());
        println!("{}{author}: {}", "  ".repeat(depth), thread.comment.content);
        print_threads(&thread.replies, depth + 1);
    }
}
