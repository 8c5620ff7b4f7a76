use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    db::{Store, StoreTx, TaskStore},
    error::{AppError, AppResult},
    models::{
        access::Role,
        task::{CreateTaskRequest, Task, UpdateTaskRequest},
    },
    services::{
        groups::load as load_group,
        permissions::{authorize, Policy},
    },
};

/// Photos live under `<media_dir>/tasks/`.
const PHOTO_DIR: &str = "tasks";

pub struct TaskService;

impl TaskService {
    pub async fn list<S: Store>(store: &S, actor: Uuid, group_id: i64) -> AppResult<Vec<Task>> {
        let mut tx = store.begin().await?;
        load_group(&mut tx, group_id).await?;
        authorize(&mut tx, actor, group_id, Policy::Membership).await?;
        tx.tasks_in_group(group_id).await
    }

    pub async fn create<S: Store>(
        store: &S,
        actor: Uuid,
        req: &CreateTaskRequest,
    ) -> AppResult<Task> {
        req.validate()?;
        let mut tx = store.begin().await?;
        load_group(&mut tx, req.group_id).await?;
        authorize(&mut tx, actor, req.group_id, Policy::Exact(Role::Admin)).await?;
        let task = tx.insert_task(req).await?;
        tx.commit().await?;

        info!(task_id = task.id, group_id = task.group_id, by = %actor, "task created");
        Ok(task)
    }

    pub async fn update<S: Store>(
        store: &S,
        actor: Uuid,
        id: i64,
        req: &UpdateTaskRequest,
    ) -> AppResult<Task> {
        req.validate()?;
        let mut tx = store.begin().await?;
        let task = load(&mut tx, id).await?;
        authorize(&mut tx, actor, task.group_id, Policy::NotExact(Role::User)).await?;
        let task = tx.update_task(id, req).await?;
        tx.commit().await?;

        info!(task_id = id, by = %actor, "task updated");
        Ok(task)
    }

    pub async fn delete<S: Store>(store: &S, actor: Uuid, id: i64) -> AppResult<()> {
        let mut tx = store.begin().await?;
        let task = load(&mut tx, id).await?;
        authorize(&mut tx, actor, task.group_id, Policy::Exact(Role::Admin)).await?;
        tx.delete_task(id).await?;
        tx.commit().await?;

        info!(task_id = id, group_id = task.group_id, by = %actor, "task deleted");
        Ok(())
    }

    /// Stores an uploaded image and points the task's `photo` at it.
    /// Same policy as a task update.
    pub async fn attach_photo<S: Store>(
        store: &S,
        actor: Uuid,
        id: i64,
        media_dir: &str,
        filename: &str,
        data: &[u8],
    ) -> AppResult<Task> {
        let ext = image_extension(filename)?;
        if data.is_empty() {
            return Err(AppError::Validation("Empty file".into()));
        }

        let mut tx = store.begin().await?;
        let task = load(&mut tx, id).await?;
        authorize(&mut tx, actor, task.group_id, Policy::NotExact(Role::User)).await?;

        let relative = format!("{PHOTO_DIR}/{}.{ext}", Uuid::new_v4());
        let full = Path::new(media_dir).join(&relative);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create photo directory: {e}"))?;
        }
        tokio::fs::write(&full, data)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to store photo: {e}"))?;

        let linked = match tx.set_task_photo(id, &relative).await {
            Ok(linked) => tx.commit().await.map(|_| linked),
            Err(e) => Err(e),
        };
        let linked = match linked {
            Ok(linked) => linked,
            Err(e) => {
                remove_photo(&full).await;
                return Err(e);
            }
        };

        if let Some(previous) = task.photo.as_deref().filter(|p| *p != relative) {
            remove_photo(&Path::new(media_dir).join(previous)).await;
        }

        info!(task_id = id, photo = %relative, by = %actor, "task photo attached");
        Ok(linked)
    }
}

async fn load<T: StoreTx>(tx: &mut T, id: i64) -> AppResult<Task> {
    tx.find_task(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

/// Lower-cased extension of `filename` if it names an image type.
/// Best-effort delete. A leftover file is logged, never surfaced to the caller.
async fn remove_photo(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!("could not remove photo {}: {e}", path.display());
    }
}

fn image_extension(filename: &str) -> AppResult<String> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| AppError::Validation("File must have an image extension".into()))?;
    let is_image = mime_guess::from_ext(&ext)
        .first()
        .is_some_and(|m| m.type_() == mime::IMAGE);
    if !is_image {
        return Err(AppError::Validation(format!("Unsupported file type: .{ext}")));
    }
    Ok(ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::services::groups::{
        tests::{add_member, new_group, seed_user},
        GroupService,
    };

    fn new_task(group_id: i64, name: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            group_id,
            name: name.into(),
            description: None,
            completed: false,
            deadline: None,
        }
    }

    struct Fixture {
        store: MemoryStore,
        admin: Uuid,
        manager: Uuid,
        member: Uuid,
        outsider: Uuid,
        group_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();
        let admin = seed_user(&store, "admin").await;
        let manager = seed_user(&store, "manager").await;
        let member = seed_user(&store, "member").await;
        let outsider = seed_user(&store, "outsider").await;
        let group = GroupService::create(&store, admin, &new_group("Ops")).await.unwrap();
        add_member(&store, group.id, manager, Role::Manager).await;
        add_member(&store, group.id, member, Role::User).await;
        Fixture {
            store,
            admin,
            manager,
            member,
            outsider,
            group_id: group.id,
        }
    }

    #[tokio::test]
    async fn only_admins_create_tasks() {
        let f = fixture().await;

        let task = TaskService::create(&f.store, f.admin, &new_task(f.group_id, "Deploy"))
            .await
            .unwrap();
        assert_eq!(task.group_id, f.group_id);
        assert!(!task.completed);

        for (user, forbidden) in [(f.manager, true), (f.member, true), (f.outsider, false)] {
            let err = TaskService::create(&f.store, user, &new_task(f.group_id, "Nope"))
                .await
                .unwrap_err();
            if forbidden {
                assert!(matches!(err, AppError::Forbidden(_)));
            } else {
                assert!(matches!(err, AppError::NotFound(_)));
            }
        }
        let tasks = TaskService::list(&f.store, f.member, f.group_id).await.unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[tokio::test]
    async fn create_in_missing_group_is_not_found() {
        let f = fixture().await;
        let err = TaskService::create(&f.store, f.admin, &new_task(f.group_id + 9, "Ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn managers_update_but_users_do_not() {
        let f = fixture().await;
        let task = TaskService::create(&f.store, f.admin, &new_task(f.group_id, "Deploy"))
            .await
            .unwrap();
        let done = UpdateTaskRequest {
            completed: Some(true),
            ..Default::default()
        };

        let updated = TaskService::update(&f.store, f.manager, task.id, &done).await.unwrap();
        assert!(updated.completed);
        assert_eq!(updated.name, "Deploy");

        let err = TaskService::update(&f.store, f.member, task.id, &done).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = TaskService::update(&f.store, f.outsider, task.id, &done).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_is_admin_only_and_terminal() {
        let f = fixture().await;
        let task = TaskService::create(&f.store, f.admin, &new_task(f.group_id, "Deploy"))
            .await
            .unwrap();

        let err = TaskService::delete(&f.store, f.manager, task.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        TaskService::delete(&f.store, f.admin, task.id).await.unwrap();

        let err = TaskService::delete(&f.store, f.admin, task.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let done = UpdateTaskRequest {
            completed: Some(true),
            ..Default::default()
        };
        let err = TaskService::update(&f.store, f.admin, task.id, &done).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_requires_membership() {
        let f = fixture().await;
        let err = TaskService::list(&f.store, f.outsider, f.group_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn photo_is_written_and_linked() {
        let f = fixture().await;
        let task = TaskService::create(&f.store, f.admin, &new_task(f.group_id, "Deploy"))
            .await
            .unwrap();
        let media = std::env::temp_dir().join(format!("taskgroups-test-{}", Uuid::new_v4()));
        let media_dir = media.to_str().unwrap();

        let updated =
            TaskService::attach_photo(&f.store, f.manager, task.id, media_dir, "shot.PNG", b"png")
                .await
                .unwrap();
        let photo = updated.photo.expect("photo set");
        assert!(photo.starts_with("tasks/") && photo.ends_with(".png"));
        assert_eq!(tokio::fs::read(media.join(&photo)).await.unwrap(), b"png");

        let err =
            TaskService::attach_photo(&f.store, f.member, task.id, media_dir, "shot.png", b"png")
                .await
                .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let _ = tokio::fs::remove_dir_all(&media).await;
    }

    async fn stored_photos(dir: &std::path::Path) -> Vec<String> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.join(PHOTO_DIR)).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(format!("{PHOTO_DIR}/{}", entry.file_name().to_string_lossy()));
        }
        names
    }

    #[tokio::test]
    async fn replacing_a_photo_removes_the_old_file() {
        let f = fixture().await;
        let task = TaskService::create(&f.store, f.admin, &new_task(f.group_id, "Deploy"))
            .await
            .unwrap();
        let media = std::env::temp_dir().join(format!("taskgroups-test-{}", Uuid::new_v4()));
        let media_dir = media.to_str().unwrap();

        let first = TaskService::attach_photo(&f.store, f.admin, task.id, media_dir, "a.png", b"one")
            .await
            .unwrap()
            .photo
            .unwrap();
        let second = TaskService::attach_photo(&f.store, f.admin, task.id, media_dir, "b.jpg", b"two")
            .await
            .unwrap()
            .photo
            .unwrap();
        assert_ne!(first, second);
        assert!(!media.join(&first).exists());
        assert_eq!(stored_photos(&media).await, vec![second.clone()]);

        TaskService::attach_photo(&f.store, f.member, task.id, media_dir, "c.png", b"three")
            .await
            .unwrap_err();
        assert_eq!(stored_photos(&media).await, vec![second]);

        let _ = tokio::fs::remove_dir_all(&media).await;
    }

    #[test]
    fn only_image_extensions_are_accepted() {
        assert_eq!(image_extension("a.JPG").unwrap(), "jpg");
        assert_eq!(image_extension("a.webp").unwrap(), "webp");
        assert!(image_extension("notes.txt").is_err());
        assert!(image_extension("noext").is_err());
    }
}
