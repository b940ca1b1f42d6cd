/*!
Handlers for the `/api/...` routes.

Request bodies arrive as raw `String`s and get picked apart with
`serde_json` here, so that every decoding failure funnels into the same
400 response instead of whatever an extractor would produce.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, RawQuery},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::config::Glob;
use crate::roster::{self, OpError};
use super::*;

#[derive(Debug, Deserialize)]
pub struct RegisterStudentsRequest {
    pub teacher: String,
    pub students: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CommonStudentsResponse {
    pub students: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SuspendStudentRequest {
    pub student: String,
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub teacher: String,
    pub notification: String,
}

#[derive(Debug, Serialize)]
pub struct RecipientsResponse {
    pub recipients: Vec<String>,
}

/// Pull every value of the repeatable `teacher` parameter out of a raw
/// query string, percent-decoding included, in order of appearance.
fn teacher_params(query: Option<&str>) -> Vec<String> {
    let query = match query {
        Some(q) => q,
        None => { return Vec::new(); },
    };

    url::form_urlencoded::parse(query.as_bytes())
        .filter(|(key, _)| key == "teacher")
        .map(|(_, val)| val.into_owned())
        .collect()
}

/**
`POST /api/register`

Body: `{"teacher": ..., "students": [...]}`. Success is a bare 204; the
only whole-request failure beyond a bad body is an unknown teacher.
*/
pub async fn register_students(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    log::trace!("api::register_students( [ body ] ) called.");

    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request("Bad Request"); },
    };

    let req: RegisterStudentsRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as RegisterStudentsRequest: {}",
                &body, &e
            );
            return respond_bad_request("Bad Request");
        },
    };

    match roster::register_students(
        &glob.store, &req.teacher, &req.students
    ).await {
        Ok(()) => respond_no_content(),
        Err(OpError::UnknownTeacher) => {
            respond_bad_request("Invalid teacher's email")
        },
        Err(e) => {
            log::error!(
                "Error registering students under {:?}: {}",
                &req.teacher, &e
            );
            respond_500("Error updating db")
        },
    }
}

/**
`GET /api/commonstudents?teacher=a%40x.com&teacher=b%40x.com`

The `teacher` parameter repeats, once per teacher. No teachers at all is
not an error; it just intersects nothing and returns an empty list.
*/
pub async fn common_students(
    Extension(glob): Extension<Arc<Glob>>,
    RawQuery(query): RawQuery,
) -> Response {
    log::trace!("api::common_students( {:?} ) called.", &query);

    let teachers = teacher_params(query.as_deref());

    match roster::common_students(&glob.store, &teachers).await {
        Ok(students) => (
            StatusCode::OK,
            Json(CommonStudentsResponse { students })
        ).into_response(),
        Err(e) => {
            log::error!("Error retrieving common students: {}", &e);
            respond_500("Error retrieving common students")
        },
    }
}

/**
`POST /api/suspend`

Body: `{"student": ...}`. Success is a bare 204, even when the student
was suspended already.
*/
pub async fn suspend_student(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    log::trace!("api::suspend_student( [ body ] ) called.");

    suspension_response(glob, body, true).await
}

/**
`POST /api/unsuspend`

The mirror image of `suspend_student`; same request shape.
*/
pub async fn unsuspend_student(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    log::trace!("api::unsuspend_student( [ body ] ) called.");

    suspension_response(glob, body, false).await
}

async fn suspension_response(
    glob: Arc<Glob>,
    body: Option<String>,
    suspended: bool,
) -> Response {
    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request("Bad Request"); },
    };

    let req: SuspendStudentRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as SuspendStudentRequest: {}",
                &body, &e
            );
            return respond_bad_request("Bad Request");
        },
    };

    match roster::set_suspension(&glob.store, &req.student, suspended).await {
        Ok(()) => respond_no_content(),
        Err(OpError::UnknownStudent) => {
            respond_bad_request("Invalid student's email")
        },
        Err(e) => {
            log::error!(
                "Error setting suspension of {:?} to {}: {}",
                &req.student, suspended, &e
            );
            respond_500("Error updating db")
        },
    }
}

/**
`POST /api/retrievefornotifications`

Body: `{"teacher": ..., "notification": ...}`. Responds with
`{"recipients": [...]}`: the students mentioned in the notification text
plus the teacher's registered students, minus anyone suspended.
*/
pub async fn retrieve_for_notifications(
    Extension(glob): Extension<Arc<Glob>>,
    body: Option<String>,
) -> Response {
    log::trace!("api::retrieve_for_notifications( [ body ] ) called.");

    let body = match body {
        Some(body) => body,
        None => { return respond_bad_request("Bad Request"); },
    };

    let req: NotificationRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            log::error!(
                "Error deserializing JSON {:?} as NotificationRequest: {}",
                &body, &e
            );
            return respond_bad_request("Bad Request");
        },
    };

    match roster::notification_recipients(
        &glob.store, &req.teacher, &req.notification
    ).await {
        Ok(recipients) => (
            StatusCode::OK,
            Json(RecipientsResponse { recipients })
        ).into_response(),
        Err(OpError::UnknownTeacher) => {
            respond_bad_request("Invalid teacher's email")
        },
        Err(e) => {
            log::error!(
                "Error resolving recipients for {:?}: {}", &req.teacher, &e
            );
            respond_500("Error retrieving registered students")
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teacher_params_from_query() {
        assert_eq!(
            teacher_params(Some(
                "teacher=teacherken%40gmail.com&teacher=teacherjoe%40gmail.com"
            )),
            vec!["teacherken@gmail.com", "teacherjoe@gmail.com"]
        );

        // Unrelated parameters are ignored.
        assert_eq!(
            teacher_params(Some(
                "student=zed%40gmail.com&teacher=teacherken%40gmail.com"
            )),
            vec!["teacherken@gmail.com"]
        );

        assert!(teacher_params(Some("")).is_empty());
        assert!(teacher_params(None).is_empty());
    }

    #[test]
    fn request_bodies_are_strict() {
        let req: RegisterStudentsRequest = serde_json::from_str(
            r#"{"teacher": "teacherken@gmail.com",
                "students": ["studentjon@gmail.com"]}"#
        ).unwrap();
        assert_eq!(req.teacher, "teacherken@gmail.com");
        assert_eq!(req.students, vec!["studentjon@gmail.com"]);

        // A missing field is a malformed request, not an empty list.
        assert!(serde_json::from_str::<RegisterStudentsRequest>(
            r#"{"teacher": "teacherken@gmail.com"}"#
        ).is_err());
        assert!(serde_json::from_str::<NotificationRequest>(
            r#"{"teacher": "teacherken@gmail.com"}"#
        ).is_err());
    }
}
