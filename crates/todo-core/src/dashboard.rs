use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::error::{TodoError, TodoResult};
use crate::gateway::TodoApi;
use crate::stats::{Stats, compute_stats};
use crate::todo::{NewTodo, Todo, TodoId, TodoPatch};
use crate::view::{ViewQuery, apply_view};

/// A user-triggered mutation or load, keyed for request tracking.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Load,
    Create,
    Update(TodoId),
    Delete(TodoId),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    #[default]
    Idle,
    InFlight,
    Succeeded,
    Failed(TodoError),
}

/// The in-memory todo collection. Only gateway responses mutate it.
#[derive(Debug, Default)]
pub struct Dashboard {
    todos: Vec<Todo>,
    requests: HashMap<Action, RequestState>,
}

impl Dashboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn todos(&self) -> &[Todo] {
        &self.todos
    }

    pub fn find(&self, id: &TodoId) -> Option<&Todo> {
        self.todos.iter().find(|todo| &todo.id == id)
    }

    pub fn request_state(&self, action: &Action) -> RequestState {
        self.requests.get(action).cloned().unwrap_or_default()
    }

    /// True while the action's request is outstanding; callers use it to
    /// disable the triggering control.
    pub fn is_busy(&self, action: &Action) -> bool {
        matches!(self.requests.get(action), Some(RequestState::InFlight))
    }

    pub fn view(&self, query: &ViewQuery, now: DateTime<Utc>) -> Vec<&Todo> {
        apply_view(&self.todos, query, now)
    }

    pub fn stats(&self, now: DateTime<Utc>) -> Stats {
        compute_stats(&self.todos, now)
    }

    pub fn apply_loaded(&mut self, todos: Vec<Todo>) {
        self.todos = todos;
    }

    pub fn apply_created(&mut self, todo: Todo) {
        self.upsert(todo);
    }

    /// Replaces the local copy with the server's full record; the last
    /// response applied wins.
    pub fn apply_updated(&mut self, todo: Todo) {
        self.upsert(todo);
    }

    pub fn apply_removed(&mut self, id: &TodoId) -> bool {
        let before = self.todos.len();
        self.todos.retain(|todo| &todo.id != id);
        self.todos.len() != before
    }

    fn upsert(&mut self, todo: Todo) {
        match self.todos.iter_mut().find(|existing| existing.id == todo.id) {
            Some(existing) => *existing = todo,
            None => self.todos.push(todo),
        }
    }

    fn begin(&mut self, action: &Action) {
        if self.is_busy(action) {
            debug!(?action, "action already in flight; last response wins");
        }
        self.requests.insert(action.clone(), RequestState::InFlight);
    }

    fn settle<T>(&mut self, action: Action, result: &TodoResult<T>) {
        let state = match result {
            Ok(_) => RequestState::Succeeded,
            Err(err) => RequestState::Failed(err.clone()),
        };
        self.requests.insert(action, state);
    }

    #[instrument(skip(self, api, token))]
    pub async fn refresh<A>(&mut self, api: &A, token: Option<&str>) -> TodoResult<()>
    where
        A: TodoApi + ?Sized,
    {
        self.begin(&Action::Load);
        let result = api.list_todos(token).await;
        self.settle(Action::Load, &result);
        let todos = result?;
        info!(count = todos.len(), "loaded todos");
        self.apply_loaded(todos);
        Ok(())
    }

    /// GET by id; the fetched record replaces any local copy.
    #[instrument(skip(self, api, token), fields(id = %id))]
    pub async fn fetch<A>(&mut self, api: &A, token: Option<&str>, id: &TodoId) -> TodoResult<Todo>
    where
        A: TodoApi + ?Sized,
    {
        let todo = api.get_todo(token, id).await?;
        self.apply_updated(todo.clone());
        Ok(todo)
    }

    #[instrument(skip(self, api, token, draft))]
    pub async fn create<A>(
        &mut self,
        api: &A,
        token: Option<&str>,
        draft: &NewTodo,
    ) -> TodoResult<Todo>
    where
        A: TodoApi + ?Sized,
    {
        if let Err(err) = draft.validate() {
            self.settle::<()>(Action::Create, &Err(err.clone()));
            return Err(err);
        }

        self.begin(&Action::Create);
        let result = api.create_todo(token, &draft.normalized()).await;
        self.settle(Action::Create, &result);
        let todo = result?;
        info!(id = %todo.id, "created todo");
        self.apply_created(todo.clone());
        Ok(todo)
    }

    #[instrument(skip(self, api, token, patch), fields(id = %id))]
    pub async fn update<A>(
        &mut self,
        api: &A,
        token: Option<&str>,
        id: &TodoId,
        patch: &TodoPatch,
    ) -> TodoResult<Todo>
    where
        A: TodoApi + ?Sized,
    {
        let action = Action::Update(id.clone());
        if let Err(err) = patch.validate() {
            self.settle::<()>(action, &Err(err.clone()));
            return Err(err);
        }

        self.begin(&action);
        let result = api.update_todo(token, id, patch).await;
        self.settle(action, &result);
        let todo = result?;
        self.apply_updated(todo.clone());
        Ok(todo)
    }

    /// Flips `completed`, fetching the record first when it is not loaded.
    #[instrument(skip(self, api, token), fields(id = %id))]
    pub async fn toggle<A>(&mut self, api: &A, token: Option<&str>, id: &TodoId) -> TodoResult<Todo>
    where
        A: TodoApi + ?Sized,
    {
        let completed = match self.find(id) {
            Some(todo) => todo.completed,
            None => self.fetch(api, token, id).await?.completed,
        };
        self.update(api, token, id, &TodoPatch::completed(!completed))
            .await
    }

    #[instrument(skip(self, api, token), fields(id = %id))]
    pub async fn delete<A>(&mut self, api: &A, token: Option<&str>, id: &TodoId) -> TodoResult<()>
    where
        A: TodoApi + ?Sized,
    {
        let action = Action::Delete(id.clone());
        self.begin(&action);
        let result = api.delete_todo(token, id).await;
        self.settle(action, &result);
        result?;
        self.apply_removed(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::{Action, Dashboard, RequestState};
    use crate::error::{TodoError, TodoResult};
    use crate::gateway::TodoApi;
    use crate::todo::{NewTodo, OpaqueId, Todo, TodoId, TodoPatch};

    #[derive(Default)]
    struct FakeApi {
        rows: Mutex<Vec<Todo>>,
        next_id: Mutex<u64>,
    }

    /// Mirrors the server: omitted fields stay, explicit clears reset to `None`.
    fn apply_server_patch(todo: &mut Todo, patch: &TodoPatch, now: DateTime<Utc>) {
        if let Some(title) = &patch.title {
            todo.title = title.clone();
        }
        if let Some(description) = &patch.description {
            todo.description = description.clone();
        }
        if let Some(completed) = patch.completed {
            todo.completed = completed;
        }
        if let Some(due_date) = patch.due_date {
            todo.due_date = due_date;
        }
        if let Some(priority) = patch.priority {
            todo.priority = priority;
        }
        todo.updated_at = now;
    }

    fn not_found() -> TodoError {
        TodoError::RequestFailed {
            status: 404,
            message: "Todo not found".to_string(),
        }
    }

    #[async_trait]
    impl TodoApi for FakeApi {
        async fn list_todos(&self, _token: Option<&str>) -> TodoResult<Vec<Todo>> {
            Ok(self.rows.lock().expect("lock").clone())
        }

        async fn get_todo(&self, _token: Option<&str>, id: &TodoId) -> TodoResult<Todo> {
            self.rows
                .lock()
                .expect("lock")
                .iter()
                .find(|todo| &todo.id == id)
                .cloned()
                .ok_or_else(not_found)
        }

        async fn create_todo(&self, _token: Option<&str>, draft: &NewTodo) -> TodoResult<Todo> {
            let mut next = self.next_id.lock().expect("lock");
            *next += 1;
            let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("now")
                + Duration::minutes(*next as i64);
            let todo = Todo {
                id: OpaqueId::new(next.to_string()),
                title: draft.title.clone(),
                description: draft.description.clone(),
                completed: false,
                user_id: Some(OpaqueId::new("1")),
                created_at: now,
                updated_at: now,
                due_date: draft.due_date,
                priority: draft.priority,
            };
            self.rows.lock().expect("lock").push(todo.clone());
            Ok(todo)
        }

        async fn update_todo(
            &self,
            _token: Option<&str>,
            id: &TodoId,
            patch: &TodoPatch,
        ) -> TodoResult<Todo> {
            let mut rows = self.rows.lock().expect("lock");
            let todo = rows.iter_mut().find(|todo| &todo.id == id).ok_or_else(not_found)?;
            let now = todo.updated_at + Duration::seconds(1);
            apply_server_patch(todo, patch, now);
            Ok(todo.clone())
        }

        async fn delete_todo(&self, _token: Option<&str>, id: &TodoId) -> TodoResult<()> {
            let mut rows = self.rows.lock().expect("lock");
            let before = rows.len();
            rows.retain(|todo| &todo.id != id);
            if rows.len() == before {
                return Err(not_found());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_update_delete_flow_tracks_request_state() {
        let api = FakeApi::default();
        let mut dashboard = Dashboard::new();

        let created = dashboard
            .create(&api, Some("t"), &NewTodo::new("  Write report "))
            .await
            .expect("create");
        assert_eq!(created.title, "Write report");
        assert_eq!(dashboard.request_state(&Action::Create), RequestState::Succeeded);
        assert_eq!(dashboard.todos().len(), 1);

        let toggled = dashboard
            .toggle(&api, Some("t"), &created.id)
            .await
            .expect("toggle");
        assert!(toggled.completed);
        assert!(dashboard.find(&created.id).expect("local copy").completed);

        dashboard
            .delete(&api, Some("t"), &created.id)
            .await
            .expect("delete");
        assert!(dashboard.todos().is_empty());
        assert_eq!(
            dashboard.request_state(&Action::Delete(created.id.clone())),
            RequestState::Succeeded
        );
    }

    #[tokio::test]
    async fn update_replaces_local_copy_with_server_record() {
        let api = FakeApi::default();
        let mut dashboard = Dashboard::new();
        let mut draft = NewTodo::new("plan trip");
        draft.description = Some("book hotel".to_string());
        draft.priority = Some(crate::todo::Priority::High);
        let created = dashboard
            .create(&api, None, &draft)
            .await
            .expect("create");

        let patch = TodoPatch {
            description: Some(None),
            priority: Some(None),
            ..TodoPatch::default()
        };
        let updated = dashboard
            .update(&api, None, &created.id, &patch)
            .await
            .expect("update");

        assert_eq!(updated.title, "plan trip");
        assert_eq!(updated.description, None);
        assert_eq!(updated.priority, None);
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(dashboard.find(&created.id), Some(&updated));
    }

    #[tokio::test]
    async fn blank_title_fails_without_calling_api() {
        let api = FakeApi::default();
        let mut dashboard = Dashboard::new();

        let err = dashboard
            .create(&api, None, &NewTodo::new(""))
            .await
            .expect_err("must fail");

        assert!(matches!(err, TodoError::ValidationFailed(_)));
        assert!(matches!(
            dashboard.request_state(&Action::Create),
            RequestState::Failed(TodoError::ValidationFailed(_))
        ));
        assert!(api.rows.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failed_delete_keeps_local_copy() {
        let api = FakeApi::default();
        let mut dashboard = Dashboard::new();
        let created = dashboard
            .create(&api, None, &NewTodo::new("keep me"))
            .await
            .expect("create");
        api.rows.lock().expect("lock").clear();

        let err = dashboard
            .delete(&api, None, &created.id)
            .await
            .expect_err("must fail");

        assert_eq!(err.user_message(), "Todo not found");
        assert_eq!(dashboard.todos().len(), 1);
        assert_eq!(
            dashboard.request_state(&Action::Delete(created.id)),
            RequestState::Failed(err)
        );
    }

    #[tokio::test]
    async fn toggle_fetches_unloaded_record() {
        let api = FakeApi::default();
        let mut seeding = Dashboard::new();
        let created = seeding
            .create(&api, None, &NewTodo::new("remote only"))
            .await
            .expect("create");

        let mut dashboard = Dashboard::new();
        let toggled = dashboard
            .toggle(&api, None, &created.id)
            .await
            .expect("toggle");

        assert!(toggled.completed);
        assert_eq!(dashboard.todos().len(), 1);
    }

    #[test]
    fn last_applied_update_wins() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("now");
        let original = Todo {
            id: OpaqueId::new("1"),
            title: "first".to_string(),
            description: None,
            completed: false,
            user_id: None,
            created_at: now,
            updated_at: now,
            due_date: None,
            priority: None,
        };
        let mut dashboard = Dashboard::new();
        dashboard.apply_loaded(vec![original.clone()]);

        let mut slow = original.clone();
        slow.title = "slow".to_string();
        let mut fast = original;
        fast.title = "fast".to_string();

        dashboard.apply_updated(fast);
        dashboard.apply_updated(slow);

        assert_eq!(dashboard.todos().len(), 1);
        assert_eq!(dashboard.todos()[0].title, "slow");
        assert!(!dashboard.apply_removed(&OpaqueId::new("missing")));
    }
}
