//! Project listing command: `vibe projects`.

use anyhow::{Context, Result, bail};
use vibe::config::VibeConfig;
use vibe::db::VibeDb;

pub async fn cmd_projects(config: &VibeConfig, id: Option<i64>) -> Result<()> {
    let path = &config.database.path;
    if !path.exists() {
        println!("No database at {}. Run 'vibe init' first.", path.display());
        return Ok(());
    }
    let db = VibeDb::new(path).context("Failed to open database")?;

    match id {
        None => {
            let projects = db.list_projects()?;
            if projects.is_empty() {
                println!("No projects yet.");
            }
            for project in projects {
                println!("{:>5}  {:<32}  {}", project.id, project.name, project.updated_at);
            }
        }
        Some(id) => {
            let Some(project) = db.get_project(id)? else {
                bail!("Project {} not found", id);
            };
            println!("{} ({})", project.name, project.id);
            println!();
            for entry in db.list_messages(id)? {
                let message = entry.message;
                println!("[{}] {}", message.role.as_str(), message.content);
                if let Some(fragment) = entry.fragment {
                    println!(
                        "    -> {} {} ({} files)",
                        fragment.title,
                        fragment.sandbox_url,
                        fragment.files.len()
                    );
                }
            }
        }
    }
    Ok(())
}
