/*!
The domain operations at the heart of the service: registering students
under teachers, intersecting rosters, toggling suspension, and resolving
who should receive a notification.

The operations take a [`Roster`] implementation rather than the concrete
`crate::store::Store`; the tests at the bottom of this file run them
against an in-memory stand-in.
*/
use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use regex::Regex;

use crate::store::DbError;
use crate::user::{Registration, Student, Teacher};

/**
The persistence surface the domain operations run against.

`crate::store::Store` is the real thing. Every method is a single round
trip; none of them hold state between calls.
*/
#[async_trait]
pub trait Roster {
    /// The teacher with this email, if any.
    async fn get_teacher(&self, email: &str)
        -> Result<Option<Teacher>, DbError>;

    /// The student with this email, if any.
    async fn get_student(&self, email: &str)
        -> Result<Option<Student>, DbError>;

    /// Ensure a single registry row for the pair; `Ok(true)` when a new
    /// row was created, `Ok(false)` when the pair was already present.
    async fn register_pair(
        &self,
        teacher_email: &str,
        student_email: &str,
    ) -> Result<bool, DbError>;

    /// Emails of students registered under every teacher in the (already
    /// deduplicated) list.
    async fn common_students(
        &self,
        teacher_emails: &[String],
    ) -> Result<Vec<String>, DbError>;

    /// All registry rows for the teacher, in the order they were created.
    async fn registrations_for_teacher(
        &self,
        teacher_email: &str,
    ) -> Result<Vec<Registration>, DbError>;

    /// Write the suspension flag for the student, returning the number of
    /// records updated.
    async fn set_suspended(
        &self,
        student_email: &str,
        suspended: i16,
    ) -> Result<u64, DbError>;
}

/**
What can go wrong with a roster operation, beyond what the storage layer
has to say about it.

The first two variants are the caller's fault; handlers turn them into
400s and `Db` into a 500.
*/
#[derive(Debug, PartialEq)]
pub enum OpError {
    UnknownTeacher,
    UnknownStudent,
    Db(DbError),
}

impl From<DbError> for OpError {
    fn from(e: DbError) -> OpError { OpError::Db(e) }
}

impl std::fmt::Display for OpError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            OpError::UnknownTeacher => write!(f, "no such teacher"),
            OpError::UnknownStudent => write!(f, "no such student"),
            OpError::Db(e) => write!(f, "database error: {}", e.display()),
        }
    }
}

static MENTION: OnceCell<Regex> = OnceCell::new();

/**
Extract the emails mentioned `@`-style in notification text, in order of
appearance, leading `@` stripped. Duplicates are kept; callers that care
deduplicate afterward.

The pattern is a fixed grammar, not a general email validator: a literal
`@`, word characters, another `@`, word characters, a dot, word
characters. A `+` or `-` in the local part keeps the mention from
matching at all, and only the first label of a dotted domain is taken.
Senders have learned to live with this; widening it would change who
gets notified.
*/
pub fn extract_mentions(text: &str) -> Vec<String> {
    log::trace!("extract_mentions( [ {} bytes ] ) called.", text.len());

    let re = MENTION.get_or_init(|| {
        Regex::new(r"@\w+@\w+\.\w+").unwrap()
    });

    re.find_iter(text)
        .map(|m| m.as_str()[1..].to_owned())
        .collect()
}

/// Deduplicate a list of emails, keeping first occurrences in place.
fn dedup_emails(emails: &[String]) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(emails.len());
    let mut deduped: Vec<String> = Vec::with_capacity(emails.len());
    for email in emails.iter() {
        if seen.insert(email.as_str()) {
            deduped.push(email.clone());
        }
    }
    deduped
}

/**
Register each of `student_emails` under `teacher_email`.

The whole operation fails only when the teacher is unknown. Duplicate
emails in the list are collapsed, unknown students are skipped, and a
pair already in the registry is left as it is. A student whose lookup or
insertion errors is logged and skipped so the rest of the list still
gets processed.
*/
pub async fn register_students<R: Roster + Sync>(
    roster: &R,
    teacher_email: &str,
    student_emails: &[String],
) -> Result<(), OpError> {
    log::trace!(
        "register_students( {:?}, {:?} ) called.",
        teacher_email, student_emails
    );

    if roster.get_teacher(teacher_email).await?.is_none() {
        return Err(OpError::UnknownTeacher);
    }

    for email in dedup_emails(student_emails).iter() {
        match roster.get_student(email).await {
            Ok(Some(_)) => {},
            Ok(None) => {
                log::info!("No student {:?}; skipping registration.", email);
                continue;
            },
            Err(e) => {
                log::error!(
                    "Error looking up student {:?}: {}; skipping registration.",
                    email, e.display()
                );
                continue;
            },
        }

        match roster.register_pair(teacher_email, email).await {
            Ok(true) => { log::trace!("    ...registered {:?}.", email); },
            Ok(false) => {
                log::trace!("    ...{:?} already registered.", email);
            },
            Err(e) => {
                log::error!(
                    "Error registering {:?} under {:?}: {}",
                    email, teacher_email, e.display()
                );
            },
        }
    }

    Ok(())
}

/**
The emails of students registered under every one of `teacher_emails`.

The list is deduplicated first, so asking for `{ken, ken}` is asking for
ken's roster, not for students registered under ken twice. Output order
is whatever the grouping produces.
*/
pub async fn common_students<R: Roster + Sync>(
    roster: &R,
    teacher_emails: &[String],
) -> Result<Vec<String>, OpError> {
    log::trace!("common_students( {:?} ) called.", teacher_emails);

    let teachers = dedup_emails(teacher_emails);
    let students = roster.common_students(&teachers).await?;
    Ok(students)
}

/**
Set (or clear) the suspension flag on the given student.

Suspending an already-suspended student is still a success.
*/
pub async fn set_suspension<R: Roster + Sync>(
    roster: &R,
    student_email: &str,
    suspended: bool,
) -> Result<(), OpError> {
    log::trace!(
        "set_suspension( {:?}, {} ) called.",
        student_email, &suspended
    );

    if roster.get_student(student_email).await?.is_none() {
        return Err(OpError::UnknownStudent);
    }

    let flag: i16 = if suspended { 1 } else { 0 };
    let n = roster.set_suspended(student_email, flag).await?;
    if n == 0 {
        // The student vanished between the lookup and the update.
        log::warn!(
            "Suspension update for {:?} affected no rows.", student_email
        );
    }

    Ok(())
}

/**
Whether the given student should be treated as suspended for
notification purposes.

Fail-safe: a student who cannot be found, or whose lookup errors, counts
as suspended. Unknown means unreachable.
*/
pub async fn student_suspended<R: Roster + Sync>(
    roster: &R,
    email: &str,
) -> bool {
    log::trace!("student_suspended( {:?} ) called.", email);

    match roster.get_student(email).await {
        Ok(Some(s)) => s.suspended != 0,
        Ok(None) => true,
        Err(e) => {
            log::warn!(
                "Error looking up student {:?}: {}; treating as suspended.",
                email, e.display()
            );
            true
        },
    }
}

/**
Resolve who should receive `notification` when `teacher_email` sends it.

Recipients are the students mentioned `@`-style in the text plus the
students registered under the teacher, in that order, first occurrence
winning, with suspended (or unresolvable) students filtered out. A
mentioned student need not be registered under this teacher to be
reached.
*/
pub async fn notification_recipients<R: Roster + Sync>(
    roster: &R,
    teacher_email: &str,
    notification: &str,
) -> Result<Vec<String>, OpError> {
    log::trace!(
        "notification_recipients( {:?}, [ {} bytes ] ) called.",
        teacher_email, notification.len()
    );

    if roster.get_teacher(teacher_email).await?.is_none() {
        return Err(OpError::UnknownTeacher);
    }

    let registrations = roster.registrations_for_teacher(teacher_email).await?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut recipients: Vec<String> = Vec::new();

    for email in extract_mentions(notification) {
        if !seen.insert(email.clone()) {
            continue;
        }
        if !student_suspended(roster, &email).await {
            recipients.push(email);
        }
    }

    for reg in registrations.iter() {
        let email = &reg.student_email;
        if !seen.insert(email.clone()) {
            continue;
        }
        if !student_suspended(roster, email).await {
            recipients.push(email.clone());
        }
    }

    log::trace!("    ...{} recipients.", recipients.len());
    Ok(recipients)
}
