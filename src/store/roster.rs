/*
`Store` methods et. al. for the roster tables: `teachers`, `students`,
and the `registry` rows associating them.

The `Roster` trait impl at the bottom is the surface the domain operations
in `crate::roster` see; the inherent methods above it are the bulk seeding
support used by the `seed` binary.
*/
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_postgres::{Row, types::{ToSql, Type}};

use super::{Store, DbError};
use crate::roster::Roster;
use crate::user::*;

fn teacher_from_row(row: &Row) -> Result<Teacher, DbError> {
    log::trace!("teacher_from_row( {:?} ) called.", row);

    let t = Teacher {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    Ok(t)
}

fn student_from_row(row: &Row) -> Result<Student, DbError> {
    log::trace!("student_from_row( {:?} ) called.", row);

    let s = Student {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        suspended: row.try_get("suspended")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    Ok(s)
}

fn registration_from_row(row: &Row) -> Result<Registration, DbError> {
    log::trace!("registration_from_row( {:?} ) called.", row);

    let r = Registration {
        id: row.try_get("id")?,
        teacher_email: row.try_get("teacher_email")?,
        student_email: row.try_get("student_email")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    };

    Ok(r)
}

impl Store {
    /**
    Inserts all the supplied `Teacher`s, skipping any whose email is
    already in the `teachers` table, and returns the number actually
    inserted.

    The database assigns ids and timestamps; whatever the passed structs
    hold for those is ignored.
    */
    pub async fn insert_teachers(
        &self,
        teachers: &[Teacher]
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::insert_teachers( [ {} teachers ] ) called.",
            teachers.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        let insert_query = t.prepare_typed(
            "INSERT INTO teachers (email, name) VALUES ($1, $2)
                ON CONFLICT (email) DO NOTHING",
            &[Type::TEXT, Type::TEXT]
        ).await?;

        /*
        The parameters referenced in the concurrent insert statements must
        be in slices of references bound _outside_ the async call pushed
        into `FuturesUnordered`, hence `pvec`. Obnoxious, but it is what
        the borrow checker will accept.
        */
        let mut n_inserted: usize = 0;
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 2]> = teachers.iter()
                .map(|tch| {
                    let p: [&(dyn ToSql + Sync); 2] = [&tch.email, &tch.name];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_query, params));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(0) => { /* Email already present; skipped. */ },
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!("Error inserting teacher: {}", &e);
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;

        log::trace!(
            "    ...inserted {} of {} teachers.",
            &n_inserted, teachers.len()
        );
        Ok(n_inserted)
    }

    /**
    Inserts all the supplied `Student`s, skipping emails already present,
    and returns the number actually inserted.
    */
    pub async fn insert_students(
        &self,
        students: &[Student]
    ) -> Result<usize, DbError> {
        log::trace!(
            "Store::insert_students( [ {} students ] ) called.",
            students.len()
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await?;
        let insert_query = t.prepare_typed(
            "INSERT INTO students (email, name, suspended)
                VALUES ($1, $2, $3)
                ON CONFLICT (email) DO NOTHING",
            &[Type::TEXT, Type::TEXT, Type::INT2]
        ).await?;

        let mut n_inserted: usize = 0;
        {
            let pvec: Vec<[&(dyn ToSql + Sync); 3]> = students.iter()
                .map(|s| {
                    let p: [&(dyn ToSql + Sync); 3] =
                        [&s.email, &s.name, &s.suspended];
                    p
                }).collect();

            let mut inserts = FuturesUnordered::new();
            for params in pvec.iter() {
                inserts.push(t.execute(&insert_query, params));
            }

            while let Some(res) = inserts.next().await {
                match res {
                    Ok(0) => { /* Email already present; skipped. */ },
                    Ok(_) => { n_inserted += 1; },
                    Err(e) => {
                        let estr = format!("Error inserting student: {}", &e);
                        return Err(DbError(estr));
                    },
                }
            }
        }

        t.commit().await?;

        log::trace!(
            "    ...inserted {} of {} students.",
            &n_inserted, students.len()
        );
        Ok(n_inserted)
    }
}

#[async_trait]
impl Roster for Store {
    async fn get_teacher(
        &self,
        email: &str,
    ) -> Result<Option<Teacher>, DbError> {
        log::trace!("Store::get_teacher( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM teachers WHERE email = $1",
            &[&email]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error querying for teacher")
        )? {
            None => Ok(None),
            Some(row) => Ok(Some(teacher_from_row(&row)?)),
        }
    }

    async fn get_student(
        &self,
        email: &str,
    ) -> Result<Option<Student>, DbError> {
        log::trace!("Store::get_student( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM students WHERE email = $1",
            &[&email]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error querying for student")
        )? {
            None => Ok(None),
            Some(row) => Ok(Some(student_from_row(&row)?)),
        }
    }

    /// Ensure a single `registry` row for the pair, returning whether a
    /// new row was actually created.
    async fn register_pair(
        &self,
        teacher_email: &str,
        student_email: &str,
    ) -> Result<bool, DbError> {
        log::trace!(
            "Store::register_pair( {:?}, {:?} ) called.",
            teacher_email, student_email
        );

        let client = self.connect().await?;
        let n = client.execute(
            "INSERT INTO registry (teacher_email, student_email)
                VALUES ($1, $2)
                ON CONFLICT (teacher_email, student_email) DO NOTHING",
            &[&teacher_email, &student_email]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error inserting registration")
        )?;

        match n {
            0 => { log::trace!("    ...pair already registered."); },
            1 => { log::trace!("    ...new registration row."); },
            n => {
                log::warn!(
                    "Registering ({}, {}) affected {} rows.",
                    teacher_email, student_email, &n
                );
            },
        }

        Ok(n > 0)
    }

    async fn common_students(
        &self,
        teacher_emails: &[String],
    ) -> Result<Vec<String>, DbError> {
        log::trace!("Store::common_students( {:?} ) called.", teacher_emails);

        let client = self.connect().await?;
        let common_query = client.prepare_typed(
            "SELECT student_email FROM registry
                WHERE teacher_email = ANY($1)
                GROUP BY student_email
                HAVING COUNT(DISTINCT teacher_email) = $2",
            &[Type::TEXT_ARRAY, Type::INT8]
        ).await?;

        let n_teachers = teacher_emails.len() as i64;
        let rows = client.query(
            &common_query,
            &[&teacher_emails, &n_teachers]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error querying common students")
        )?;

        let mut emails: Vec<String> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            match row.try_get("student_email") {
                Ok(email) => { emails.push(email); },
                Err(e) => {
                    if emails.is_empty() {
                        // A read error before any row has decoded has
                        // always counted as "no common students", and
                        // callers rely on it. Whether it should is an
                        // open question.
                        log::warn!(
                            "Error reading first common-students row: {}", &e
                        );
                        return Ok(emails);
                    }
                    let err = DbError::from(e)
                        .annotate("Error reading common-students row");
                    return Err(err);
                },
            }
        }

        log::trace!("    ...{} common students.", emails.len());
        Ok(emails)
    }

    async fn registrations_for_teacher(
        &self,
        teacher_email: &str,
    ) -> Result<Vec<Registration>, DbError> {
        log::trace!(
            "Store::registrations_for_teacher( {:?} ) called.",
            teacher_email
        );

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM registry WHERE teacher_email = $1 ORDER BY id",
            &[&teacher_email]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error querying registrations")
        )?;

        let mut regs: Vec<Registration> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            regs.push(registration_from_row(row)?);
        }

        Ok(regs)
    }

    /// Write `suspended` (0 or 1) for the given student, returning the
    /// number of rows affected (0 when no such student exists).
    async fn set_suspended(
        &self,
        student_email: &str,
        suspended: i16,
    ) -> Result<u64, DbError> {
        log::trace!(
            "Store::set_suspended( {:?}, {} ) called.",
            student_email, &suspended
        );

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE students SET suspended = $1, updated_at = now()
                WHERE email = $2",
            &[&suspended, &student_email]
        ).await.map_err(|e|
            DbError::from(e).annotate("Error updating student suspension")
        )?;

        if n > 1 {
            log::warn!(
                "Updating suspension of single student {} affected {} rows.",
                student_email, &n
            );
        }

        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::OffsetDateTime;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    static TEACHERS: &[(&str, &str)] = &[
        ("teacherken@gmail.com", "Teacher Ken"),
        ("teacherjoe@gmail.com", "Teacher Joe"),
    ];

    static STUDENTS: &[(&str, &str)] = &[
        ("studentjon@gmail.com", "Jon"),
        ("studenthon@gmail.com", "Hon"),
        ("studenttom@gmail.com", "Tom"),
        ("studentunderkenonly@gmail.com", "Mary"),
    ];

    fn fake_teacher(email: &str, name: &str) -> Teacher {
        let now = OffsetDateTime::now_utc();
        Teacher {
            id: 0,
            email: email.to_owned(),
            name: name.to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    fn fake_student(email: &str, name: &str) -> Student {
        let now = OffsetDateTime::now_utc();
        Student {
            id: 0,
            email: email.to_owned(),
            name: name.to_owned(),
            suspended: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded_store() -> Store {
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let teachers: Vec<Teacher> = TEACHERS.iter()
            .map(|(email, name)| fake_teacher(email, name))
            .collect();
        let students: Vec<Student> = STUDENTS.iter()
            .map(|(email, name)| fake_student(email, name))
            .collect();

        assert_eq!(
            db.insert_teachers(&teachers).await.unwrap(),
            TEACHERS.len()
        );
        assert_eq!(
            db.insert_students(&students).await.unwrap(),
            STUDENTS.len()
        );
        // Reseeding the same rows should touch nothing.
        assert_eq!(db.insert_teachers(&teachers).await.unwrap(), 0);
        assert_eq!(db.insert_students(&students).await.unwrap(), 0);

        db
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn register_and_intersect() {
        ensure_logging();

        let db = seeded_store().await;

        for stud in [
            "studentjon@gmail.com",
            "studenthon@gmail.com",
            "studentunderkenonly@gmail.com",
        ] {
            assert!(
                db.register_pair("teacherken@gmail.com", stud).await.unwrap()
            );
        }
        for stud in ["studentjon@gmail.com", "studenthon@gmail.com"] {
            assert!(
                db.register_pair("teacherjoe@gmail.com", stud).await.unwrap()
            );
        }
        // Same pair again; the unique constraint should swallow it.
        assert!(
            !db.register_pair("teacherken@gmail.com", "studentjon@gmail.com")
                .await.unwrap()
        );

        let just_ken = vec!["teacherken@gmail.com".to_owned()];
        let mut unders = db.common_students(&just_ken).await.unwrap();
        unders.sort();
        assert_eq!(
            unders,
            vec![
                "studenthon@gmail.com",
                "studentjon@gmail.com",
                "studentunderkenonly@gmail.com",
            ]
        );

        let both = vec![
            "teacherken@gmail.com".to_owned(),
            "teacherjoe@gmail.com".to_owned(),
        ];
        let mut unders = db.common_students(&both).await.unwrap();
        unders.sort();
        assert_eq!(
            unders,
            vec!["studenthon@gmail.com", "studentjon@gmail.com"]
        );

        let nobody = vec!["teachernone@gmail.com".to_owned()];
        assert!(db.common_students(&nobody).await.unwrap().is_empty());

        // Fetch order is insertion order.
        let regs = db.registrations_for_teacher("teacherjoe@gmail.com")
            .await.unwrap();
        let emails: Vec<&str> = regs.iter()
            .map(|r| r.student_email.as_str())
            .collect();
        assert_eq!(
            emails,
            vec!["studentjon@gmail.com", "studenthon@gmail.com"]
        );

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn suspension_round_trip() {
        ensure_logging();

        let db = seeded_store().await;
        let jon = "studentjon@gmail.com";

        assert_eq!(db.get_student(jon).await.unwrap().unwrap().suspended, 0);

        assert_eq!(db.set_suspended(jon, 1).await.unwrap(), 1);
        assert_eq!(db.get_student(jon).await.unwrap().unwrap().suspended, 1);

        // Suspending an already-suspended student still touches its row.
        assert_eq!(db.set_suspended(jon, 1).await.unwrap(), 1);
        assert_eq!(db.get_student(jon).await.unwrap().unwrap().suspended, 1);

        assert_eq!(db.set_suspended(jon, 0).await.unwrap(), 1);
        assert_eq!(db.get_student(jon).await.unwrap().unwrap().suspended, 0);

        assert_eq!(db.set_suspended("nobody@nowhere.com", 1).await.unwrap(), 0);

        assert!(
            db.get_teacher("teacherken@gmail.com").await.unwrap().is_some()
        );
        assert!(db.get_teacher(jon).await.unwrap().is_none());

        db.nuke_database().await.unwrap();
    }
}
