//! End-to-end flows through forms, session, routing and consoles
//!
//! Runs against the in-memory backend, so no external services are needed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use taskdesk_shared::{
    backend::{
        memory::MemoryBackend, AccessToken, AuthApi, AuthSession, AuthSubscription, Backend,
        BackendError, BackendResult, Identity, SignUp, TaskTable, UserTable,
    },
    console::{admin::AdminConsole, member::MemberConsole, NoticeLevel},
    forms::{self, FormError, LoginForm, RegisterForm, RegistrationPolicy, REGISTRATION_MESSAGE},
    models::{
        task::{
            NewTask, Task, TaskDraft, TaskPriority, TaskScope, TaskUpdate, PROGRESS_RANGE_MESSAGE,
            REQUIRED_FIELDS_MESSAGE,
        },
        user::{NewProfile, Role, UserProfile},
    },
    routing::{decide, Decision, Route},
    session::{resolve, Resolution},
    store::{StoreError, TaskStore},
};

const SECRET: &str = "console-flow-test-secret-32-bytes!!";

fn backend() -> Arc<dyn Backend> {
    Arc::new(MemoryBackend::new(SECRET))
}

async fn register(backend: &dyn Backend, email: &str, username: &str, role: Role) {
    let form = RegisterForm {
        email: email.to_string(),
        username: username.to_string(),
        password: "correct horse".to_string(),
        role,
    };
    forms::register(backend, &form, &RegistrationPolicy::open())
        .await
        .expect("registration should succeed");
}

async fn login(backend: &dyn Backend, email: &str) -> forms::LoginOutcome {
    forms::login(
        backend,
        &LoginForm {
            email: email.to_string(),
            password: "correct horse".to_string(),
        },
    )
    .await
    .expect("login should succeed")
}

async fn admin_console(backend: &Arc<dyn Backend>, email: &str) -> AdminConsole {
    let outcome = login(backend.as_ref(), email).await;
    let store = TaskStore::new(backend.clone(), outcome.session.access_token);
    AdminConsole::load(store, outcome.user).await.unwrap()
}

async fn member_console(backend: &Arc<dyn Backend>, email: &str) -> MemberConsole {
    let outcome = login(backend.as_ref(), email).await;
    let store = TaskStore::new(backend.clone(), outcome.session.access_token);
    MemberConsole::load(store, outcome.user).await.unwrap()
}

/// In-memory backend that counts task writes and can be told to fail them
struct FlakyBackend {
    inner: MemoryBackend,
    writes: AtomicUsize,
    failure: Mutex<Option<BackendError>>,
}

impl FlakyBackend {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryBackend::new(SECRET),
            writes: AtomicUsize::new(0),
            failure: Mutex::new(None),
        })
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Every following task write fails with `error`
    fn fail_with(&self, error: BackendError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    /// Counts the write, then reports the injected failure if there is one
    fn write(&self) -> BackendResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AuthApi for FlakyBackend {
    async fn sign_up(&self, email: &str, password: &str) -> BackendResult<SignUp> {
        self.inner.sign_up(email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> BackendResult<AuthSession> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self, token: &AccessToken) -> BackendResult<()> {
        self.inner.sign_out(token).await
    }

    async fn current_identity(&self, token: &AccessToken) -> BackendResult<Option<Identity>> {
        self.inner.current_identity(token).await
    }

    async fn refresh(&self, refresh_token: &str) -> BackendResult<AuthSession> {
        self.inner.refresh(refresh_token).await
    }

    fn subscribe(&self) -> AuthSubscription {
        self.inner.subscribe()
    }

    fn subscriber_count(&self) -> usize {
        self.inner.subscriber_count()
    }
}

#[async_trait]
impl UserTable for FlakyBackend {
    async fn select_profile(
        &self,
        token: &AccessToken,
        id: Uuid,
    ) -> BackendResult<Option<UserProfile>> {
        self.inner.select_profile(token, id).await
    }

    async fn select_profiles(&self, token: &AccessToken) -> BackendResult<Vec<UserProfile>> {
        self.inner.select_profiles(token).await
    }

    async fn insert_profile(
        &self,
        token: &AccessToken,
        profile: NewProfile,
    ) -> BackendResult<UserProfile> {
        self.inner.insert_profile(token, profile).await
    }
}

#[async_trait]
impl TaskTable for FlakyBackend {
    async fn select_tasks(&self, token: &AccessToken, scope: TaskScope) -> BackendResult<Vec<Task>> {
        self.inner.select_tasks(token, scope).await
    }

    async fn insert_task(&self, token: &AccessToken, task: NewTask) -> BackendResult<Task> {
        self.write()?;
        self.inner.insert_task(token, task).await
    }

    async fn update_task(
        &self,
        token: &AccessToken,
        id: Uuid,
        update: TaskUpdate,
    ) -> BackendResult<Option<Task>> {
        self.write()?;
        self.inner.update_task(token, id, update).await
    }

    async fn delete_task(&self, token: &AccessToken, id: Uuid) -> BackendResult<bool> {
        self.write()?;
        self.inner.delete_task(token, id).await
    }
}

impl Backend for FlakyBackend {
    fn kind(&self) -> &'static str {
        "flaky"
    }
}

fn draft(title: &str, assignee: &str) -> TaskDraft {
    TaskDraft {
        title: title.to_string(),
        description: "Q1 numbers".to_string(),
        assignee: assignee.to_string(),
        due_date: "2025-03-01".to_string(),
        priority: TaskPriority::High,
    }
}

#[tokio::test]
async fn test_registration_stores_exactly_the_chosen_role() {
    let backend = backend();

    for (i, role) in Role::ALL.into_iter().enumerate() {
        let email = format!("user{}@example.com", i);
        let form = RegisterForm {
            email: email.clone(),
            username: format!("user{}", i),
            password: "pw".to_string(),
            role,
        };
        let outcome = forms::register(backend.as_ref(), &form, &RegistrationPolicy::open())
            .await
            .unwrap();

        assert_eq!(outcome.profile.role, role);
        assert_eq!(outcome.message, REGISTRATION_MESSAGE);
        assert_eq!(outcome.redirect_to, Route::Login);
        assert_eq!(outcome.redirect_after.as_millis(), 3000);
    }
}

#[tokio::test]
async fn test_restricted_policy_refuses_staff_roles() {
    let backend = backend();
    let policy = RegistrationPolicy::restricted([Role::TeamMember]);

    let form = RegisterForm {
        email: "boss@example.com".to_string(),
        username: "boss".to_string(),
        password: "pw".to_string(),
        role: Role::Admin,
    };
    let err = forms::register(backend.as_ref(), &form, &policy)
        .await
        .unwrap_err();
    assert!(matches!(err, FormError::RoleNotPermitted(Role::Admin)));

    // Nothing was created, so the email is still free
    let form = RegisterForm {
        role: Role::TeamMember,
        ..form
    };
    assert!(forms::register(backend.as_ref(), &form, &policy).await.is_ok());
}

#[tokio::test]
async fn test_login_lands_by_role() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "manager@example.com", "max", Role::Manager).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    assert_eq!(
        login(backend.as_ref(), "admin@example.com").await.landing,
        Route::AdminDashboard
    );
    assert_eq!(
        login(backend.as_ref(), "manager@example.com").await.landing,
        Route::AdminDashboard
    );
    assert_eq!(
        login(backend.as_ref(), "member@example.com").await.landing,
        Route::Dashboard
    );
}

#[tokio::test]
async fn test_login_with_bad_password_shows_inline_error() {
    let backend = backend();
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let err = forms::login(
        backend.as_ref(),
        &LoginForm {
            email: "member@example.com".to_string(),
            password: "wrong".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FormError::Credentials(_)));
    assert_eq!(err.to_string(), "Invalid login credentials");
}

#[tokio::test]
async fn test_login_without_profile_stays_on_login() {
    let backend = backend();
    backend.sign_up("ghost@example.com", "pw").await.unwrap();

    let err = forms::login(
        backend.as_ref(),
        &LoginForm {
            email: "ghost@example.com".to_string(),
            password: "pw".to_string(),
        },
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FormError::RoleLookup(None)));
    assert_eq!(err.to_string(), "Failed to fetch user role.");
}

#[tokio::test]
async fn test_admin_creates_member_reports_admin_sees_progress() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let mut admin = admin_console(&backend, "admin@example.com").await;
    let member_id = admin
        .users()
        .iter()
        .find(|u| u.username == "mia")
        .map(|u| u.id)
        .unwrap();

    let notice = admin
        .create(&draft("Draft report", &member_id.to_string()))
        .await
        .unwrap();
    assert_eq!(notice.level, NoticeLevel::Success);
    assert_eq!(notice.message, "Task created successfully!");

    let created = admin.tasks().last().cloned().unwrap();
    assert_eq!(created.title, "Draft report");
    assert_eq!(admin.assignee_name(&created), "mia");

    let mut member = member_console(&backend, "member@example.com").await;
    assert_eq!(member.tasks().len(), 1);
    assert_eq!(member.tasks()[0].id, created.id);
    assert_eq!(member.tasks()[0].progress.value(), 0);

    member.set_progress_input(created.id, "45");
    let notice = member.submit_progress(created.id).await.unwrap();
    assert_eq!(notice.message, "Progress updated successfully!");
    assert_eq!(member.tasks()[0].progress.value(), 45);
    assert_eq!(member.tasks()[0].title, "Draft report");

    admin.refresh().await.unwrap();
    let seen = admin.tasks().iter().find(|t| t.id == created.id).unwrap();
    assert_eq!(seen.progress.value(), 45);
}

#[tokio::test]
async fn test_out_of_range_progress_is_never_sent() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let mut admin = admin_console(&backend, "admin@example.com").await;
    let member_id = admin.users().iter().find(|u| u.username == "mia").unwrap().id;
    admin
        .create(&draft("Draft report", &member_id.to_string()))
        .await
        .unwrap();

    let mut member = member_console(&backend, "member@example.com").await;
    let id = member.tasks()[0].id;
    member.update_progress(id, "30").await.unwrap();

    for bad in ["-5", "101", "abc", ""] {
        let err = member.update_progress(id, bad).await.unwrap_err();
        assert!(err.is_local());
        assert_eq!(err.to_string(), PROGRESS_RANGE_MESSAGE);
        assert_eq!(member.tasks()[0].progress.value(), 30);
    }

    // The stored row was not touched either
    let stored = backend
        .select_tasks(
            &login(backend.as_ref(), "member@example.com").await.session.access_token,
            TaskScope::AssignedTo(member_id),
        )
        .await
        .unwrap();
    assert_eq!(stored[0].progress.value(), 30);
}

#[tokio::test]
async fn test_create_requires_title_due_date_and_assignee() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    let mut admin = admin_console(&backend, "admin@example.com").await;
    let someone = admin.user().id.to_string();

    let blanks = [
        TaskDraft {
            title: String::new(),
            ..draft("x", &someone)
        },
        TaskDraft {
            due_date: " ".to_string(),
            ..draft("x", &someone)
        },
        draft("x", ""),
    ];

    for blank in &blanks {
        let err = admin.create(blank).await.unwrap_err();
        assert!(err.is_local());
        assert_eq!(err.to_string(), REQUIRED_FIELDS_MESSAGE);
    }
    assert!(admin.tasks().is_empty());

    admin.create(&draft("x", &someone)).await.unwrap();
    assert_eq!(admin.tasks().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_only_the_target() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    let mut admin = admin_console(&backend, "admin@example.com").await;
    let me = admin.user().id.to_string();

    for title in ["one", "two", "three"] {
        admin.create(&draft(title, &me)).await.unwrap();
    }
    let target = admin.tasks()[1].id;

    let notice = admin.delete(target).await.unwrap();
    assert_eq!(notice.message, "Task deleted successfully!");

    let titles: Vec<&str> = admin.tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["one", "three"]);

    // A second delete of the same row fails and leaves the list alone
    let err = admin.delete(target).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert_eq!(err.to_string(), "Failed to delete task.");
    assert_eq!(admin.tasks().len(), 2);
}

#[tokio::test]
async fn test_edit_form_updates_the_row() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    let mut admin = admin_console(&backend, "admin@example.com").await;
    let me = admin.user().id.to_string();

    admin.open_create();
    admin.set_draft(draft("Draft report", &me));
    admin.submit().await.unwrap();
    let id = admin.tasks()[0].id;

    assert!(admin.begin_edit(id));
    assert_eq!(admin.draft().title, "Draft report");

    let mut edited = admin.draft().clone();
    edited.title = "Final report".to_string();
    edited.priority = TaskPriority::Low;
    admin.set_draft(edited);

    let notice = admin.submit().await.unwrap();
    assert_eq!(notice.message, "Task updated successfully!");
    assert_eq!(admin.tasks()[0].title, "Final report");
    assert_eq!(admin.tasks()[0].priority, TaskPriority::Low);

    // Blank title on edit is rejected and the form stays open
    assert!(admin.begin_edit(id));
    let mut blank = admin.draft().clone();
    blank.title.clear();
    admin.set_draft(blank);
    assert!(admin.submit().await.unwrap_err().is_local());
    assert_eq!(admin.tasks()[0].title, "Final report");

    admin.cancel();
    assert!(admin.submit().await.is_err());
}

#[tokio::test]
async fn test_assignee_without_profile_is_unassigned() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    let mut admin = admin_console(&backend, "admin@example.com").await;

    let stranger = uuid::Uuid::new_v4();
    admin
        .create(&draft("Orphan", &stranger.to_string()))
        .await
        .unwrap();

    let view = admin.view();
    assert_eq!(view.tasks[0].assignee_name, "Unassigned");
}

#[tokio::test]
async fn test_unauthenticated_admin_dashboard_redirects_to_login() {
    let backend = backend();
    let resolution = resolve(backend.as_ref(), None).await.unwrap();
    assert_eq!(resolution, Resolution::Unauthenticated);

    assert_eq!(
        decide(None, Route::AdminDashboard.path()),
        Decision::Redirect(Route::Login)
    );
}

#[tokio::test]
async fn test_member_cannot_touch_tasks_outside_their_list() {
    let backend = backend();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let mut admin = admin_console(&backend, "admin@example.com").await;
    let admin_id = admin.user().id.to_string();
    admin.create(&draft("Not yours", &admin_id)).await.unwrap();
    let foreign = admin.tasks()[0].id;

    let mut member = member_console(&backend, "member@example.com").await;
    assert!(member.tasks().is_empty());

    let err = member.update_progress(foreign, "50").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    admin.refresh().await.unwrap();
    assert_eq!(admin.tasks()[0].progress.value(), 0);
}

#[tokio::test]
async fn test_invalid_input_never_reaches_the_backend() {
    let flaky = FlakyBackend::new();
    let backend: Arc<dyn Backend> = flaky.clone();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let mut admin = admin_console(&backend, "admin@example.com").await;
    let member_id = admin.users().iter().find(|u| u.username == "mia").unwrap().id;

    let blank = TaskDraft {
        title: "  ".to_string(),
        ..draft("x", &member_id.to_string())
    };
    assert!(admin.create(&blank).await.unwrap_err().is_local());
    assert_eq!(flaky.writes(), 0);

    admin.create(&draft("Draft report", &member_id.to_string())).await.unwrap();
    let id = admin.tasks()[0].id;
    assert_eq!(flaky.writes(), 1);

    assert!(admin.update(id, &blank).await.unwrap_err().is_local());
    assert_eq!(flaky.writes(), 1);

    let mut member = member_console(&backend, "member@example.com").await;
    for bad in ["-1", "101", "4.5", "ten"] {
        member.set_progress_input(id, bad);
        let err = member.submit_progress(id).await.unwrap_err();
        assert_eq!(err.to_string(), PROGRESS_RANGE_MESSAGE);
    }
    assert_eq!(flaky.writes(), 1);
}

#[tokio::test]
async fn test_failed_writes_show_toast_and_keep_the_list() {
    let flaky = FlakyBackend::new();
    let backend: Arc<dyn Backend> = flaky.clone();
    register(backend.as_ref(), "admin@example.com", "ada", Role::Admin).await;
    register(backend.as_ref(), "member@example.com", "mia", Role::TeamMember).await;

    let mut admin = admin_console(&backend, "admin@example.com").await;
    let member_id = admin.users().iter().find(|u| u.username == "mia").unwrap().id;
    admin.create(&draft("Draft report", &member_id.to_string())).await.unwrap();
    let id = admin.tasks()[0].id;
    let mut member = member_console(&backend, "member@example.com").await;

    flaky.fail_with(BackendError::Transport("connection reset".to_string()));
    let admin_before = admin.tasks().to_vec();

    let err = admin.create(&draft("Second", &member_id.to_string())).await.unwrap_err();
    assert!(!err.is_local());
    assert_eq!(
        err.to_string(),
        "Failed to create task: Transport error: connection reset"
    );
    assert_eq!(admin.tasks(), admin_before.as_slice());

    let err = admin.update(id, &draft("Renamed", &member_id.to_string())).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to update task.");
    assert_eq!(admin.tasks(), admin_before.as_slice());

    flaky.fail_with(BackendError::Rejected("row-level security".to_string()));

    let err = admin.delete(id).await.unwrap_err();
    assert!(matches!(err.backend_error(), Some(BackendError::Rejected(_))));
    assert_eq!(err.to_string(), "Failed to delete task.");
    assert_eq!(admin.tasks(), admin_before.as_slice());

    let member_before = member.tasks().to_vec();
    member.set_progress_input(id, "60");
    let err = member.submit_progress(id).await.unwrap_err();
    assert_eq!(err.to_string(), "Failed to update progress.");
    assert_eq!(member.tasks(), member_before.as_slice());
    assert_eq!(member.progress_input(id), "60");

    // Every attempt reached the backend
    assert_eq!(flaky.writes(), 5);
}
