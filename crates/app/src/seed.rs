//! Demo curriculum and accounts for local runs.

use anyhow::Context;
use services::AppServices;
use storage::repository::{NewSectionRecord, NewUserRecord, StorageError};
use tracing::info;
use tutor_core::model::{
    BlockKind, HierarchyId, QuizBlock, QuizSummaryBlock, ResearchGroup, SectionId, YouTubeBlock,
};

struct PageSpec {
    slug: &'static str,
    label: &'static str,
    blocks: fn() -> Vec<BlockKind>,
}

fn video(id: &str, title: &str) -> BlockKind {
    BlockKind::YouTube(YouTubeBlock {
        video_id: id.to_owned(),
        title: title.to_owned(),
    })
}

fn quiz(title: &str, class: &str) -> BlockKind {
    BlockKind::Quiz(QuizBlock {
        title: title.to_owned(),
        css_extra: class.to_owned(),
    })
}

fn group_pages() -> Vec<PageSpec> {
    vec![
        PageSpec {
            slug: "welcome",
            label: "Welcome",
            blocks: || vec![video("intro-001", "Welcome to the study")],
        },
        PageSpec {
            slug: "pretest",
            label: "Pretest",
            blocks: || vec![quiz("Pretest", "pretest")],
        },
        PageSpec {
            slug: "lesson",
            label: "Lesson",
            blocks: || {
                vec![
                    video("lesson-001", "Fractions, part one"),
                    video("lesson-002", "Fractions, part two"),
                ]
            },
        },
        PageSpec {
            slug: "posttest",
            label: "Posttest",
            blocks: || {
                vec![
                    quiz("Posttest", "posttest"),
                    BlockKind::QuizSummary(QuizSummaryBlock {
                        quiz_class: "pretest".to_owned(),
                    }),
                ]
            },
        },
    ]
}

fn video_pages() -> Vec<PageSpec> {
    vec![PageSpec {
        slug: "library",
        label: "Video library",
        blocks: || {
            vec![
                video("lesson-001", "Fractions, part one"),
                video("lesson-002", "Fractions, part two"),
                video("extra-001", "Decimals"),
            ]
        },
    }]
}

/// Load the demo hierarchies `a`, `b` and `videos` plus a few accounts.
/// Hierarchies that already exist are left alone.
///
/// # Errors
///
/// Returns an error if any repository write fails.
pub async fn seed(app: &AppServices) -> anyhow::Result<()> {
    for (name, pages) in [
        ("a", group_pages()),
        ("b", group_pages()),
        ("videos", video_pages()),
    ] {
        seed_hierarchy(app, name, &pages).await?;
    }

    let accounts = app.accounts();
    for (username, group) in [("p001", 'a'), ("p002", 'b'), ("p003", 'a')] {
        let user = match accounts.create_user(NewUserRecord::participant(username)).await {
            Ok(user) => user,
            Err(services::AccountError::Storage(StorageError::Conflict)) => continue,
            Err(err) => return Err(err).context(format!("creating {username}")),
        };
        accounts
            .assign_research_group(user.id, ResearchGroup::new(group)?)
            .await?;
    }
    match accounts.create_user(NewUserRecord::staff("researcher")).await {
        Ok(_) | Err(services::AccountError::Storage(StorageError::Conflict)) => {}
        Err(err) => return Err(err).context("creating researcher"),
    }

    info!("demo data loaded");
    Ok(())
}

async fn seed_hierarchy(app: &AppServices, name: &str, pages: &[PageSpec]) -> anyhow::Result<()> {
    let curriculum = &app.storage().curriculum;
    if curriculum.hierarchy_by_name(name).await?.is_some() {
        info!(hierarchy = name, "hierarchy exists, skipping");
        return Ok(());
    }

    let hierarchy = curriculum
        .create_hierarchy(name, &format!("/pages/{name}/"))
        .await?;
    let root = root_of(app, hierarchy.id).await?;
    for page in pages {
        let section = curriculum
            .insert_section(NewSectionRecord {
                hierarchy_id: hierarchy.id,
                parent_id: Some(root),
                slug: page.slug.to_owned(),
                label: page.label.to_owned(),
            })
            .await?;
        for block in (page.blocks)() {
            curriculum.insert_block(section, block).await?;
        }
    }
    info!(hierarchy = name, pages = pages.len(), "hierarchy seeded");
    Ok(())
}

async fn root_of(app: &AppServices, hierarchy_id: HierarchyId) -> anyhow::Result<SectionId> {
    let sections = app.storage().curriculum.sections(hierarchy_id).await?;
    sections
        .first()
        .map(|s| s.id)
        .context("hierarchy has no root section")
}
