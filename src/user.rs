/*!
The teacher, student, and registry records the service administers.

All three are keyed by email for every lookup the service performs; the
numeric ids exist only because the tables have them.
*/
use std::io::Read;

use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq)]
pub struct Teacher {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Student {
    pub id: i64,
    pub email: String,
    pub name: String,
    /// 0 = active, 1 = suspended.
    pub suspended: i16,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One teacher/student association. The (teacher_email, student_email)
/// pair is unique in the registry table.
#[derive(Clone, Debug, PartialEq)]
pub struct Registration {
    pub id: i64,
    pub teacher_email: String,
    pub student_email: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Teacher {
    /**
    Teacher .csv rows should look like this

    ```csv
    #email,                name
    teacherken@gmail.com,  Ken
    ```
    */
    pub fn from_csv_line(
        row: &csv::StringRecord
    ) -> Result<Teacher, &'static str> {
        log::trace!("Teacher::from_csv_line( {:?} ) called.", row);

        let email = match row.get(0) {
            Some(s) => s.to_owned(),
            None => { return Err("no email address"); },
        };
        let name = match row.get(1) {
            Some(s) => s.to_owned(),
            None => { return Err("no name"); },
        };

        let t = Teacher {
            // The database assigns these upon insertion.
            id: 0,
            email,
            name,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        Ok(t)
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<Teacher>, String> {
        log::trace!("Teacher::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(false)
            .from_reader(r);

        let mut teachers: Vec<Teacher> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match Teacher::from_csv_line(&record) {
                    Ok(t) => { teachers.push(t); },
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!(
                                "Error on line {}: {}", p.line(), &e
                            ),
                            None => format!(
                                "Error in CSV record {}: {}", &n, &e
                            ),
                        };
                        return Err(estr);
                    },
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!(
                            "Error on line {}: {}", p.line(), &e
                        ),
                        None => format!(
                            "Error in CSV record {}: {}", &n, &e
                        ),
                    };
                    return Err(estr);
                },
            }
        }

        log::trace!(
            "Teacher::vec_from_csv_reader() returns {} Teachers.",
            teachers.len()
        );
        Ok(teachers)
    }
}

impl Student {
    /**
    Student .csv rows should look like this

    ```csv
    #email,                name
    studentjon@gmail.com,  Jon
    ```
    */
    pub fn from_csv_line(
        row: &csv::StringRecord
    ) -> Result<Student, &'static str> {
        log::trace!("Student::from_csv_line( {:?} ) called.", row);

        let email = match row.get(0) {
            Some(s) => s.to_owned(),
            None => { return Err("no email address"); },
        };
        let name = match row.get(1) {
            Some(s) => s.to_owned(),
            None => { return Err("no name"); },
        };

        let stud = Student {
            // The database assigns these upon insertion.
            id: 0,
            email,
            name,
            // Freshly seeded students start active.
            suspended: 0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        Ok(stud)
    }

    pub fn vec_from_csv_reader<R: Read>(r: R) -> Result<Vec<Student>, String> {
        log::trace!("Student::vec_from_csv_reader(...) called.");

        let mut csv_reader = csv::ReaderBuilder::new()
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .flexible(false)
            .has_headers(false)
            .from_reader(r);

        let mut students: Vec<Student> = Vec::new();

        for (n, res) in csv_reader.records().enumerate() {
            match res {
                Ok(record) => match Student::from_csv_line(&record) {
                    Ok(stud) => { students.push(stud); },
                    Err(e) => {
                        let estr = match record.position() {
                            Some(p) => format!(
                                "Error on line {}: {}", p.line(), &e
                            ),
                            None => format!(
                                "Error in CSV record {}: {}", &n, &e
                            ),
                        };
                        return Err(estr);
                    },
                },
                Err(e) => {
                    let estr = match e.position() {
                        Some(p) => format!(
                            "Error on line {}: {}", p.line(), &e
                        ),
                        None => format!(
                            "Error in CSV record {}: {}", &n, &e
                        ),
                    };
                    return Err(estr);
                },
            }
        }

        students.shrink_to_fit();
        log::trace!(
            "Student::vec_from_csv_reader() returns {} Students.",
            students.len()
        );
        Ok(students)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    use std::io::Cursor;

    static STUDENT_CSV: &str = "\
#email,                        name
studentjon@gmail.com,          Jon
studenthon@gmail.com,          Hon
studentunderkenonly@gmail.com, Stu1
";

    #[test]
    fn students_from_csv() {
        ensure_logging();

        let studs = Student::vec_from_csv_reader(
            Cursor::new(STUDENT_CSV)
        ).unwrap();

        assert_eq!(studs.len(), 3);
        assert_eq!(&studs[0].email, "studentjon@gmail.com");
        assert_eq!(&studs[2].name, "Stu1");
        assert!(studs.iter().all(|s| s.suspended == 0));
    }

    #[test]
    fn teachers_from_csv() {
        ensure_logging();

        let teachers = Teacher::vec_from_csv_reader(
            Cursor::new("teacherken@gmail.com, Ken\nteacherjoe@gmail.com, Joe\n")
        ).unwrap();

        assert_eq!(teachers.len(), 2);
        assert_eq!(&teachers[1].name, "Joe");
    }

    #[test]
    fn short_row_is_an_error() {
        ensure_logging();

        // A one-column row doesn't parse as anything useful; the reader
        // is inflexible, so the record itself is rejected.
        let res = Student::vec_from_csv_reader(
            Cursor::new("studentjon@gmail.com, Jon\nstudenthon@gmail.com\n")
        );
        assert!(res.is_err());
    }
}
