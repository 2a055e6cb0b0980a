//! In-memory fakes of the storage and delivery seams, plus fixtures.
//!
//! Used by this crate's tests and by the api crate's router tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use campusdesk_common::{AppError, AppResult};
use campusdesk_db::{
    entities::{
        audit_log::{self, AuditAction, AuditResource},
        complaint::{self, Attachments, ComplaintCategory, ComplaintStatus, Priority},
        complaint_remark, notification,
        user::{self, AccountStatus, UserRole},
    },
    repositories::{AuditLogFilter, ComplaintFilter},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};

use crate::services::{
    AuditTrailRecorder, Claims, EmailTransport, EventBus, NotificationFanout, RealtimeFrame,
    RealtimePublisher, RoleChannel, WorkflowOrchestrator, WorkflowSubscriber,
    access_policy::normalize_department,
    store::{AuditStore, ComplaintStore, NotificationStore, UserDirectory},
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A `pending_review`, medium-priority complaint created just now.
#[must_use]
pub fn complaint_fixture(id: &str, creator_id: &str, department: &str) -> complaint::Model {
    let now = Utc::now();
    complaint::Model {
        id: id.to_string(),
        title: format!("Complaint {id}"),
        description: "The heating in the library has been off all week".to_string(),
        category: ComplaintCategory::Facilities,
        department: department.to_string(),
        department_key: normalize_department(department),
        priority: Priority::Medium,
        attachments: Attachments::default(),
        is_anonymous: false,
        status: ComplaintStatus::PendingReview,
        rejection_reason: None,
        verification_status: None,
        verification_comment: None,
        verified_by: None,
        verified_at: None,
        resolved_at: None,
        resolution_time_hours: None,
        due_date: (now + Duration::hours(72)).into(),
        is_overdue: false,
        hours_remaining: 72.0,
        creator_id: creator_id.to_string(),
        assigned_to: None,
        version: 1,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

/// An active, approved account named `User {id}` at `{id}@example.edu`.
#[must_use]
pub fn user_fixture(id: &str, role: UserRole, department: Option<&str>) -> user::Model {
    user::Model {
        id: id.to_string(),
        name: format!("User {id}"),
        email: format!("{id}@example.edu"),
        role,
        department: department.map(str::to_string),
        student_id: (role == UserRole::Student).then(|| format!("S-{id}")),
        is_active: true,
        account_status: AccountStatus::Approved,
        created_at: Utc::now().into(),
    }
}

/// Sign an HS256 token the way the identity service does.
#[must_use]
pub fn issue_token(secret: &str, sub: &str, iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        iat: iat.timestamp(),
        exp: exp.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}

#[derive(Default)]
struct ComplaintState {
    complaints: HashMap<String, complaint::Model>,
    remarks: Vec<complaint_remark::Model>,
    race_next_write: bool,
}

impl ComplaintState {
    /// Apply a pending simulated writer, then check the stored version.
    fn check_version(&mut self, id: &str, expected_version: i32) -> AppResult<()> {
        if std::mem::take(&mut self.race_next_write)
            && let Some(stored) = self.complaints.get_mut(id)
        {
            stored.version += 1;
        }

        match self.complaints.get(id) {
            Some(stored) if stored.version == expected_version => Ok(()),
            _ => Err(AppError::Conflict(format!(
                "Complaint {id} was modified by another request"
            ))),
        }
    }
}

/// Complaint store with the same version check as the repository.
#[derive(Default)]
pub struct InMemoryComplaintStore {
    state: Mutex<ComplaintState>,
}

impl InMemoryComplaintStore {
    /// Insert or overwrite a complaint as-is.
    pub fn put(&self, complaint: complaint::Model) {
        lock(&self.state)
            .complaints
            .insert(complaint.id.clone(), complaint);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<complaint::Model> {
        lock(&self.state).complaints.get(id).cloned()
    }

    #[must_use]
    pub fn all(&self) -> Vec<complaint::Model> {
        lock(&self.state).complaints.values().cloned().collect()
    }

    /// Make another writer commit just before the next save or delete.
    pub fn race_next_write(&self) {
        lock(&self.state).race_next_write = true;
    }
}

#[async_trait]
impl ComplaintStore for InMemoryComplaintStore {
    async fn insert(&self, complaint: complaint::Model) -> AppResult<complaint::Model> {
        let mut state = lock(&self.state);
        if state.complaints.contains_key(&complaint.id) {
            return Err(AppError::Database(format!("duplicate key {}", complaint.id)));
        }
        state
            .complaints
            .insert(complaint.id.clone(), complaint.clone());
        Ok(complaint)
    }

    async fn find(&self, id: &str) -> AppResult<Option<complaint::Model>> {
        Ok(self.get(id))
    }

    async fn save(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
    ) -> AppResult<complaint::Model> {
        let mut state = lock(&self.state);
        state.check_version(&complaint.id, expected_version)?;
        state
            .complaints
            .insert(complaint.id.clone(), complaint.clone());
        Ok(complaint)
    }

    async fn list(
        &self,
        filter: &ComplaintFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<complaint::Model>, u64)> {
        let state = lock(&self.state);
        let mut matching: Vec<_> = state
            .complaints
            .values()
            .filter(|c| filter.creator_id.as_ref().is_none_or(|id| c.creator_id == *id))
            .filter(|c| {
                filter
                    .department_key
                    .as_ref()
                    .is_none_or(|k| c.department_key == *k)
            })
            .filter(|c| filter.status.is_none_or(|s| c.status == s))
            .filter(|c| filter.priority.is_none_or(|p| c.priority == p))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }

    async fn delete(&self, id: &str, expected_version: i32) -> AppResult<()> {
        let mut state = lock(&self.state);
        state.check_version(id, expected_version)?;
        state.remarks.retain(|r| r.complaint_id != id);
        state.complaints.remove(id);
        Ok(())
    }

    async fn save_with_remark(
        &self,
        complaint: complaint::Model,
        expected_version: i32,
        remark: complaint_remark::Model,
    ) -> AppResult<(complaint::Model, complaint_remark::Model)> {
        let mut state = lock(&self.state);
        state.check_version(&complaint.id, expected_version)?;
        state
            .complaints
            .insert(complaint.id.clone(), complaint.clone());
        state.remarks.push(remark.clone());
        Ok((complaint, remark))
    }

    async fn remarks(&self, complaint_id: &str) -> AppResult<Vec<complaint_remark::Model>> {
        Ok(lock(&self.state)
            .remarks
            .iter()
            .filter(|r| r.complaint_id == complaint_id)
            .cloned()
            .collect())
    }
}

/// Append-only audit store. Can be told to fail every write.
#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<audit_log::Model>>,
    fail_writes: Mutex<bool>,
}

impl InMemoryAuditStore {
    /// Entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<audit_log::Model> {
        lock(&self.entries).clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }

    fn matches(filter: &AuditLogFilter, e: &audit_log::Model) -> bool {
        let search_ok = filter.search.as_ref().is_none_or(|s| {
            e.target_id_display.as_ref().is_some_and(|t| t.contains(s.as_str()))
                || e.actor_id
                    .as_ref()
                    .is_some_and(|id| filter.search_actor_ids.contains(id))
        });
        search_ok
            && filter
                .actor_id
                .as_ref()
                .is_none_or(|id| e.actor_id.as_ref() == Some(id))
            && filter.action.is_none_or(|a| e.action == a)
            && filter.resource.is_none_or(|r| e.resource == r)
            && filter
                .actor_role
                .as_ref()
                .is_none_or(|r| e.actor_role.as_ref() == Some(r))
            && filter.status.is_none_or(|s| e.status == s)
            && filter
                .start
                .is_none_or(|t| e.created_at.with_timezone(&Utc) >= t)
            && filter
                .end
                .is_none_or(|t| e.created_at.with_timezone(&Utc) <= t)
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, entry: audit_log::Model) -> AppResult<audit_log::Model> {
        if *lock(&self.fail_writes) {
            return Err(AppError::Database("audit store unavailable".to_string()));
        }
        lock(&self.entries).push(entry.clone());
        Ok(entry)
    }

    async fn find(&self, id: &str) -> AppResult<Option<audit_log::Model>> {
        Ok(lock(&self.entries).iter().find(|e| e.id == id).cloned())
    }

    async fn query(
        &self,
        filter: &AuditLogFilter,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<audit_log::Model>, u64)> {
        let matching: Vec<_> = lock(&self.entries)
            .iter()
            .rev()
            .filter(|e| Self::matches(filter, e))
            .cloned()
            .collect();
        let total = matching.len() as u64;
        Ok((
            matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        ))
    }

    async fn count_since(&self, since: DateTime<Utc>) -> AppResult<u64> {
        Ok(lock(&self.entries)
            .iter()
            .filter(|e| e.created_at.with_timezone(&Utc) >= since)
            .count() as u64)
    }

    async fn count_by_action(&self) -> AppResult<Vec<(AuditAction, i64)>> {
        let mut counts: HashMap<AuditAction, i64> = HashMap::new();
        for e in lock(&self.entries).iter() {
            *counts.entry(e.action).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_str().cmp(b.0.as_str())));
        Ok(counts)
    }

    async fn count_by_resource(&self) -> AppResult<Vec<(AuditResource, i64)>> {
        let mut counts: HashMap<AuditResource, i64> = HashMap::new();
        for e in lock(&self.entries).iter() {
            *counts.entry(e.resource).or_default() += 1;
        }
        let mut counts: Vec<_> = counts.into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.as_str().cmp(b.0.as_str())));
        Ok(counts)
    }
}

/// Notification store. Writes for selected recipients can be made to fail.
#[derive(Default)]
pub struct InMemoryNotificationStore {
    items: Mutex<Vec<notification::Model>>,
    failing: Mutex<HashSet<String>>,
}

impl InMemoryNotificationStore {
    /// Stored notifications in insertion order.
    #[must_use]
    pub fn all(&self) -> Vec<notification::Model> {
        lock(&self.items).clone()
    }

    pub fn fail_for(&self, recipient_id: &str) {
        lock(&self.failing).insert(recipient_id.to_string());
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create(&self, notification: notification::Model) -> AppResult<notification::Model> {
        if lock(&self.failing).contains(&notification.recipient_id) {
            return Err(AppError::Database("notification store unavailable".to_string()));
        }
        lock(&self.items).push(notification.clone());
        Ok(notification)
    }

    async fn list(
        &self,
        recipient_id: &str,
        unread_only: bool,
        limit: u64,
        offset: u64,
    ) -> AppResult<(Vec<notification::Model>, u64)> {
        let matching: Vec<_> = lock(&self.items)
            .iter()
            .rev()
            .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        let total = matching.len() as u64;
        Ok((
            matching
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect(),
            total,
        ))
    }

    async fn mark_read(&self, id: &str, recipient_id: &str) -> AppResult<bool> {
        let mut items = lock(&self.items);
        match items
            .iter_mut()
            .find(|n| n.id == id && n.recipient_id == recipient_id)
        {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, recipient_id: &str) -> AppResult<u64> {
        let mut count = 0;
        for n in lock(&self.items)
            .iter_mut()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
        {
            n.is_read = true;
            count += 1;
        }
        Ok(count)
    }

    async fn count_unread(&self, recipient_id: &str) -> AppResult<u64> {
        Ok(lock(&self.items)
            .iter()
            .filter(|n| n.recipient_id == recipient_id && !n.is_read)
            .count() as u64)
    }
}

/// User directory over a map of accounts.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Mutex<HashMap<String, user::Model>>,
}

impl InMemoryUserDirectory {
    pub fn insert(&self, user: user::Model) {
        lock(&self.users).insert(user.id.clone(), user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find(&self, id: &str) -> AppResult<Option<user::Model>> {
        Ok(lock(&self.users).get(id).cloned())
    }

    async fn active_admins(&self) -> AppResult<Vec<user::Model>> {
        let mut admins: Vec<_> = lock(&self.users)
            .values()
            .filter(|u| u.role == UserRole::Admin && u.can_act())
            .cloned()
            .collect();
        admins.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(admins)
    }

    async fn ids_matching(&self, query: &str) -> AppResult<Vec<String>> {
        Ok(lock(&self.users)
            .values()
            .filter(|u| u.name.contains(query) || u.email.contains(query))
            .map(|u| u.id.clone())
            .collect())
    }
}

/// Email transport that records successful sends.
#[derive(Default)]
pub struct RecordingEmailTransport {
    sent: Mutex<Vec<(String, String, String)>>,
    failing: Mutex<HashSet<String>>,
    fail_all: Mutex<bool>,
}

impl RecordingEmailTransport {
    /// `(to, subject, body)` of every delivered message.
    #[must_use]
    pub fn sent(&self) -> Vec<(String, String, String)> {
        lock(&self.sent).clone()
    }

    pub fn fail_for(&self, address: &str) {
        lock(&self.failing).insert(address.to_string());
    }

    pub fn fail_all(&self, fail: bool) {
        *lock(&self.fail_all) = fail;
    }
}

#[async_trait]
impl EmailTransport for RecordingEmailTransport {
    async fn send(&self, to: &str, subject: &str, body: &str) -> bool {
        if *lock(&self.fail_all) || lock(&self.failing).contains(to) {
            return false;
        }
        lock(&self.sent).push((to.to_string(), subject.to_string(), body.to_string()));
        true
    }
}

/// Real-time publisher with a fixed set of connected users.
#[derive(Default)]
pub struct RecordingRealtime {
    connected: Mutex<HashSet<String>>,
    user_frames: Mutex<Vec<(String, RealtimeFrame)>>,
    role_frames: Mutex<Vec<(RoleChannel, RealtimeFrame)>>,
}

impl RecordingRealtime {
    pub fn connect(&self, user_id: &str) {
        lock(&self.connected).insert(user_id.to_string());
    }

    /// Frames that reached a connected user.
    #[must_use]
    pub fn user_frames(&self) -> Vec<(String, RealtimeFrame)> {
        lock(&self.user_frames).clone()
    }

    #[must_use]
    pub fn role_frames(&self) -> Vec<(RoleChannel, RealtimeFrame)> {
        lock(&self.role_frames).clone()
    }
}

impl RealtimePublisher for RecordingRealtime {
    fn publish_to_user(&self, user_id: &str, frame: &RealtimeFrame) -> bool {
        if !lock(&self.connected).contains(user_id) {
            return false;
        }
        lock(&self.user_frames).push((user_id.to_string(), frame.clone()));
        true
    }

    fn publish_to_role(&self, channel: RoleChannel, frame: &RealtimeFrame) -> bool {
        lock(&self.role_frames).push((channel, frame.clone()));
        true
    }
}

/// Fully wired workflow over in-memory fakes.
pub struct Harness {
    pub orchestrator: WorkflowOrchestrator,
    pub recorder: AuditTrailRecorder,
    pub fanout: NotificationFanout,
    pub bus: EventBus,
    pub complaints: Arc<InMemoryComplaintStore>,
    pub users: Arc<InMemoryUserDirectory>,
    pub audit: Arc<InMemoryAuditStore>,
    pub notifications: Arc<InMemoryNotificationStore>,
    pub email: Arc<RecordingEmailTransport>,
    pub realtime: Arc<RecordingRealtime>,
}

impl Harness {
    #[must_use]
    pub fn new() -> Self {
        let complaints = Arc::new(InMemoryComplaintStore::default());
        let users = Arc::new(InMemoryUserDirectory::default());
        let audit = Arc::new(InMemoryAuditStore::default());
        let notifications = Arc::new(InMemoryNotificationStore::default());
        let email = Arc::new(RecordingEmailTransport::default());
        let realtime = Arc::new(RecordingRealtime::default());

        let recorder = AuditTrailRecorder::new(audit.clone(), users.clone());
        let fanout = NotificationFanout::new(
            notifications.clone(),
            users.clone(),
            realtime.clone(),
            email.clone(),
            "CampusDesk",
        );
        let subscribers: Vec<Arc<dyn WorkflowSubscriber>> =
            vec![Arc::new(recorder.clone()), Arc::new(fanout.clone())];
        let bus = EventBus::new(subscribers);
        let orchestrator = WorkflowOrchestrator::new(complaints.clone(), users.clone(), bus.clone());

        Self {
            orchestrator,
            recorder,
            fanout,
            bus,
            complaints,
            users,
            audit,
            notifications,
            email,
            realtime,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
