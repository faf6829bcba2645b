use log::info;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data::{
    CourseCode, CourseRecord, DepartmentId, EmploymentStatus, RoomId, SchedulingInput, StudentId,
    TeacherId,
};
use crate::error::{Result, TimetableError};
use crate::expertise::subject_tag;

/// Teaching hours per day no teacher may exceed.
pub const MAX_DAILY_HOURS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Department {
    pub id: DepartmentId,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Teacher {
    pub id: TeacherId,
    pub department: DepartmentId,
    pub role: String,
    pub status: EmploymentStatus,
    pub max_daily_hours: u32,
    pub expertise: BTreeSet<String>,
}

impl Teacher {
    pub fn is_active(&self) -> bool {
        self.status == EmploymentStatus::Active
    }
}

#[derive(Debug, Clone)]
pub struct Student {
    pub id: StudentId,
    pub department: DepartmentId,
    pub semester: u32,
    pub enrolled: BTreeSet<CourseCode>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WeeklyHours {
    pub lecture: u32,
    pub practical: u32,
    pub tutorial: u32,
}

impl WeeklyHours {
    pub fn total(&self) -> u32 {
        self.lecture + self.practical + self.tutorial
    }
}

/// A course offered to one department/semester.
#[derive(Debug, Clone)]
pub struct Offering {
    pub code: CourseCode,
    pub department: DepartmentId,
    pub teaching_department: Option<DepartmentId>,
    pub semester: Option<u32>,
    pub year: Option<u32>,
    pub hours: WeeklyHours,
    pub is_lab: bool,
    pub subject: Option<String>,
    pub enrollment: u32,
    pub assigned_teacher: Option<TeacherId>,
}

impl Offering {
    /// Department whose teachers may be assigned to this offering.
    pub fn staffing_department(&self) -> &DepartmentId {
        self.teaching_department.as_ref().unwrap_or(&self.department)
    }

    /// Upper bound on weekly sessions given the mode's minimum.
    pub fn max_sessions(&self, min_instances: u32) -> u32 {
        self.hours.total().max(min_instances)
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub block: String,
    pub min_capacity: u32,
    pub max_capacity: u32,
    pub is_lab: bool,
    pub amenities: Vec<String>,
}

impl Room {
    /// Labs go to lab rooms, theory to lecture rooms, and the room must seat the class.
    pub fn fits(&self, offering: &Offering) -> bool {
        self.is_lab == offering.is_lab && self.max_capacity >= offering.enrollment
    }
}

/// Typed, cross-referenced view of one run's input.
#[derive(Debug, Clone)]
pub struct Catalog {
    pub departments: BTreeMap<DepartmentId, Department>,
    pub teachers: BTreeMap<TeacherId, Teacher>,
    pub students: Vec<Student>,
    /// Sorted by course code.
    pub offerings: Vec<Offering>,
    /// Sorted by room number.
    pub rooms: Vec<Room>,
    /// Historical (teacher, course) pairs from the faculty lists.
    pub history: Vec<(TeacherId, CourseCode)>,
}

struct DepartmentIndex {
    by_id: BTreeMap<DepartmentId, Department>,
    by_name: HashMap<String, DepartmentId>,
}

impl DepartmentIndex {
    fn resolve(&self, raw: &str) -> Option<DepartmentId> {
        if self.by_id.contains_key(raw) {
            return Some(raw.to_string());
        }
        self.by_name.get(raw).cloned()
    }

    fn require(&self, raw: &str, entity: &'static str, id: &str) -> Result<DepartmentId> {
        self.resolve(raw).ok_or_else(|| {
            TimetableError::integrity(entity, id, format!("unknown department '{}'", raw))
        })
    }
}

impl Catalog {
    pub fn build(input: &SchedulingInput) -> Result<Catalog> {
        let departments = index_departments(input)?;
        let teachers = build_teachers(input, &departments)?;
        let offerings = build_offerings(input, &departments, &teachers)?;
        let students = build_students(input, &departments, &offerings)?;
        let rooms = build_rooms(input)?;

        let mut history = Vec::with_capacity(input.faculty_links.len());
        for link in &input.faculty_links {
            if !teachers.contains_key(&link.teacher_email) {
                return Err(TimetableError::integrity(
                    "faculty link",
                    &link.course_code,
                    format!("unknown teacher '{}'", link.teacher_email),
                ));
            }
            if offerings.binary_search_by(|o| o.code.cmp(&link.course_code)).is_err() {
                return Err(TimetableError::integrity(
                    "faculty link",
                    &link.course_code,
                    "unknown course",
                ));
            }
            history.push((link.teacher_email.clone(), link.course_code.clone()));
        }

        let catalog = Catalog {
            departments: departments.by_id,
            teachers,
            students,
            offerings,
            rooms,
            history,
        };
        info!(
            "Loaded catalog: {} departments, {} teachers ({} active), {} students, {} courses ({} lab), {} rooms ({} lab), {} faculty links",
            catalog.departments.len(),
            catalog.teachers.len(),
            catalog.teachers.values().filter(|t| t.is_active()).count(),
            catalog.students.len(),
            catalog.offerings.len(),
            catalog.offerings.iter().filter(|o| o.is_lab).count(),
            catalog.rooms.len(),
            catalog.rooms.iter().filter(|r| r.is_lab).count(),
            catalog.history.len(),
        );
        Ok(catalog)
    }

    pub fn teacher(&self, id: &str) -> Option<&Teacher> {
        self.teachers.get(id)
    }

    pub fn offering(&self, code: &str) -> Option<&Offering> {
        self.offerings
            .binary_search_by(|o| o.code.as_str().cmp(code))
            .ok()
            .map(|i| &self.offerings[i])
    }

    pub fn room(&self, id: &str) -> Option<&Room> {
        self.rooms
            .binary_search_by(|r| r.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.rooms[i])
    }

    /// Offerings (by index) that share a student cohort, keyed by department and year.
    /// Only groups with more than one offering can conflict.
    pub fn cohort_groups(&self) -> BTreeMap<(DepartmentId, u32), Vec<usize>> {
        let mut groups: BTreeMap<(DepartmentId, u32), Vec<usize>> = BTreeMap::new();
        for (idx, offering) in self.offerings.iter().enumerate() {
            if let Some(year) = offering.year {
                groups
                    .entry((offering.department.clone(), year))
                    .or_default()
                    .push(idx);
            }
        }
        groups.retain(|_, members| members.len() > 1);
        groups
    }
}

fn index_departments(input: &SchedulingInput) -> Result<DepartmentIndex> {
    let mut by_id = BTreeMap::new();
    let mut by_name = HashMap::new();
    for record in &input.departments {
        if by_id.contains_key(&record.id) {
            return Err(TimetableError::integrity("department", &record.id, "duplicate id"));
        }
        if let Some(existing) = by_name.insert(record.name.clone(), record.id.clone()) {
            return Err(TimetableError::integrity(
                "department",
                &record.id,
                format!("name '{}' is already used by {}", record.name, existing),
            ));
        }
        by_id.insert(
            record.id.clone(),
            Department {
                id: record.id.clone(),
                name: record.name.clone(),
            },
        );
    }
    Ok(DepartmentIndex { by_id, by_name })
}

fn build_teachers(
    input: &SchedulingInput,
    departments: &DepartmentIndex,
) -> Result<BTreeMap<TeacherId, Teacher>> {
    let mut teachers = BTreeMap::new();
    for record in &input.teachers {
        if teachers.contains_key(&record.email) {
            return Err(TimetableError::integrity("teacher", &record.email, "duplicate email"));
        }
        let department = departments.require(&record.department, "teacher", &record.email)?;
        let teacher = Teacher {
            id: record.email.clone(),
            department,
            role: record.role.clone(),
            status: record.status,
            max_daily_hours: MAX_DAILY_HOURS,
            expertise: record.expertise.iter().map(|tag| tag.to_ascii_uppercase()).collect(),
        };
        teachers.insert(record.email.clone(), teacher);
    }
    Ok(teachers)
}

fn build_offerings(
    input: &SchedulingInput,
    departments: &DepartmentIndex,
    teachers: &BTreeMap<TeacherId, Teacher>,
) -> Result<Vec<Offering>> {
    let mut records: Vec<&CourseRecord> = input.courses.iter().collect();
    records.sort_by(|a, b| a.code.cmp(&b.code));
    if let Some(pair) = records.windows(2).find(|pair| pair[0].code == pair[1].code) {
        return Err(TimetableError::integrity("course", &pair[0].code, "duplicate course code"));
    }

    // class size falls back to the number of students enrolled
    let mut enrolled_counts: HashMap<&str, u32> = HashMap::new();
    for student in &input.students {
        for code in &student.enrolled_courses {
            *enrolled_counts.entry(code.as_str()).or_default() += 1;
        }
    }

    let mut offerings = Vec::with_capacity(records.len());
    for record in records {
        let department = departments.require(&record.department, "course", &record.code)?;
        let teaching_department = record
            .teaching_department
            .as_deref()
            .map(|raw| departments.require(raw, "course", &record.code))
            .transpose()?;

        if let Some(teacher_id) = &record.assigned_teacher {
            match teachers.get(teacher_id) {
                None => {
                    return Err(TimetableError::integrity(
                        "course",
                        &record.code,
                        format!("assigned teacher '{}' does not exist", teacher_id),
                    ));
                }
                Some(teacher) if !teacher.is_active() => {
                    return Err(TimetableError::integrity(
                        "course",
                        &record.code,
                        format!("assigned teacher '{}' has resigned", teacher_id),
                    ));
                }
                Some(_) => {}
            }
        }

        let year = match record.semester {
            Some(semester) if semester > 0 => Some(semester.div_ceil(2)),
            _ => year_from_code(&record.code),
        };
        offerings.push(Offering {
            code: record.code.clone(),
            department,
            teaching_department,
            semester: record.semester,
            year,
            hours: WeeklyHours {
                lecture: record.lecture_hours,
                practical: record.practical_hours,
                tutorial: record.tutorial_hours,
            },
            is_lab: record.practical_hours > 0,
            subject: subject_tag(&record.code),
            enrollment: record
                .expected_enrollment
                .unwrap_or_else(|| enrolled_counts.get(record.code.as_str()).copied().unwrap_or(0)),
            assigned_teacher: record.assigned_teacher.clone(),
        });
    }
    Ok(offerings)
}

/// Course codes like `CS23123` carry the year in the two digits after the prefix.
fn year_from_code(code: &str) -> Option<u32> {
    let digits: String = code
        .trim_start_matches(|c: char| c.is_ascii_alphabetic())
        .chars()
        .take(2)
        .collect();
    if digits.len() < 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year = digits.parse::<u32>().ok()? / 10;
    (year > 0).then_some(year)
}

fn build_students(
    input: &SchedulingInput,
    departments: &DepartmentIndex,
    offerings: &[Offering],
) -> Result<Vec<Student>> {
    let mut seen = BTreeSet::new();
    let mut students = Vec::with_capacity(input.students.len());
    for record in &input.students {
        if !seen.insert(record.email.as_str()) {
            return Err(TimetableError::integrity("student", &record.email, "duplicate email"));
        }
        let department = departments.require(&record.department, "student", &record.email)?;
        for code in &record.enrolled_courses {
            let offering = offerings
                .binary_search_by(|o| o.code.cmp(code))
                .map(|i| &offerings[i])
                .map_err(|_| {
                    TimetableError::integrity(
                        "student",
                        &record.email,
                        format!("enrolled in unknown course '{}'", code),
                    )
                })?;
            let semester_matches = offering.semester.is_none_or(|s| s == record.semester);
            if offering.department != department || !semester_matches {
                return Err(TimetableError::integrity(
                    "student",
                    &record.email,
                    format!(
                        "course '{}' is not offered to department {} semester {}",
                        code, department, record.semester
                    ),
                ));
            }
        }
        students.push(Student {
            id: record.email.clone(),
            department,
            semester: record.semester,
            enrolled: record.enrolled_courses.iter().cloned().collect(),
        });
    }
    Ok(students)
}

fn build_rooms(input: &SchedulingInput) -> Result<Vec<Room>> {
    let mut rooms: Vec<Room> = input
        .rooms
        .iter()
        .map(|record| Room {
            id: record.number.clone(),
            block: record.block.clone(),
            min_capacity: record.min_capacity,
            max_capacity: record.max_capacity,
            is_lab: record.is_lab,
            amenities: record.amenities.clone(),
        })
        .collect();
    rooms.sort_by(|a, b| a.id.cmp(&b.id));
    if let Some(pair) = rooms.windows(2).find(|pair| pair[0].id == pair[1].id) {
        return Err(TimetableError::integrity("room", &pair[0].id, "duplicate room number"));
    }
    if let Some(room) = rooms.iter().find(|r| r.min_capacity > r.max_capacity) {
        return Err(TimetableError::integrity(
            "room",
            &room.id,
            format!("capacity range {}..{} is empty", room.min_capacity, room.max_capacity),
        ));
    }
    Ok(rooms)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::data::{
        CourseRecord, DepartmentRecord, FacultyLinkRecord, RoomRecord, StudentRecord, TeacherRecord,
    };

    pub(crate) fn department(id: &str, name: &str) -> DepartmentRecord {
        DepartmentRecord {
            id: id.into(),
            name: name.into(),
        }
    }

    pub(crate) fn teacher(email: &str, department: &str) -> TeacherRecord {
        TeacherRecord {
            email: email.into(),
            department: department.into(),
            role: "Assistant Professor".into(),
            status: EmploymentStatus::Active,
            expertise: Vec::new(),
        }
    }

    pub(crate) fn course(code: &str, department: &str, lecture: u32, practical: u32) -> CourseRecord {
        CourseRecord {
            code: code.into(),
            department: department.into(),
            semester: None,
            lecture_hours: lecture,
            practical_hours: practical,
            tutorial_hours: 0,
            teaching_department: None,
            assigned_teacher: None,
            expected_enrollment: None,
        }
    }

    pub(crate) fn room(number: &str, is_lab: bool) -> RoomRecord {
        RoomRecord {
            number: number.into(),
            block: "A".into(),
            min_capacity: 0,
            max_capacity: 60,
            is_lab,
            amenities: Vec::new(),
        }
    }

    pub(crate) fn input(
        teachers: Vec<TeacherRecord>,
        courses: Vec<CourseRecord>,
        rooms: Vec<RoomRecord>,
    ) -> SchedulingInput {
        SchedulingInput {
            departments: vec![department("IT", "Information Technology"), department("MA", "Mathematics")],
            teachers,
            students: Vec::new(),
            courses,
            rooms,
            faculty_links: Vec::new(),
            config: SolverConfig::default(),
        }
    }

    #[test]
    fn test_build_resolves_entities() {
        let input = input(
            vec![teacher("a@college.edu", "IT")],
            vec![course("IT20001", "IT", 3, 0), course("IT21002", "Information Technology", 1, 2)],
            vec![room("R2", false), room("L1", true)],
        );
        let catalog = Catalog::build(&input).unwrap();

        let theory = catalog.offering("IT20001").unwrap();
        assert!(!theory.is_lab);
        assert_eq!(theory.subject.as_deref(), Some("IT"));
        assert_eq!(theory.year, Some(2));

        let lab = catalog.offering("IT21002").unwrap();
        assert!(lab.is_lab);
        assert_eq!(lab.department, "IT");

        assert_eq!(catalog.rooms[0].id, "L1");
        assert_eq!(catalog.teacher("a@college.edu").unwrap().max_daily_hours, 5);
    }

    #[test]
    fn test_unknown_department_fails_fast() {
        let input = input(vec![], vec![course("XX100", "ZZ", 3, 0)], vec![]);
        let err = Catalog::build(&input).unwrap_err();
        assert!(matches!(err, TimetableError::DataIntegrity { entity: "course", .. }));
    }

    #[test]
    fn test_resigned_assigned_teacher_is_rejected() {
        let mut resigned = teacher("gone@college.edu", "IT");
        resigned.status = EmploymentStatus::Resigned;
        let mut offering = course("IT20001", "IT", 3, 0);
        offering.assigned_teacher = Some("gone@college.edu".into());
        let err = Catalog::build(&input(vec![resigned], vec![offering], vec![])).unwrap_err();
        assert!(err.to_string().contains("resigned"));
    }

    #[test]
    fn test_faculty_link_to_unknown_teacher_fails() {
        let mut input = input(vec![], vec![course("IT20001", "IT", 3, 0)], vec![]);
        input.faculty_links.push(FacultyLinkRecord {
            course_code: "IT20001".into(),
            teacher_email: "nobody@college.edu".into(),
        });
        assert!(Catalog::build(&input).is_err());
    }

    #[test]
    fn test_duplicate_course_code_fails() {
        let input = input(
            vec![],
            vec![course("IT20001", "IT", 3, 0), course("IT20001", "IT", 2, 0)],
            vec![],
        );
        assert!(Catalog::build(&input).is_err());
    }

    #[test]
    fn test_duplicate_department_name_fails() {
        let mut input = input(vec![], vec![], vec![]);
        input.departments.push(department("CS", "Information Technology"));
        let err = Catalog::build(&input).unwrap_err();
        assert!(
            matches!(err, TimetableError::DataIntegrity { entity: "department", ref id, ref reason } if id == "CS" && reason.contains("IT"))
        );
    }

    #[test]
    fn test_student_enrollment_drives_class_size() {
        let mut input = input(vec![], vec![course("IT20001", "IT", 3, 0)], vec![room("R1", false)]);
        input.courses[0].semester = Some(3);
        for i in 0..3 {
            input.students.push(StudentRecord {
                email: format!("s{}@college.edu", i),
                department: "IT".into(),
                semester: 3,
                enrolled_courses: vec!["IT20001".into()],
            });
        }
        let catalog = Catalog::build(&input).unwrap();
        let offering = catalog.offering("IT20001").unwrap();
        assert_eq!(offering.enrollment, 3);
        assert_eq!(offering.year, Some(2));
    }

    #[test]
    fn test_student_in_foreign_course_fails() {
        let mut input = input(vec![], vec![course("MA10001", "MA", 3, 0)], vec![]);
        input.students.push(StudentRecord {
            email: "s@college.edu".into(),
            department: "IT".into(),
            semester: 1,
            enrolled_courses: vec!["MA10001".into()],
        });
        let err = Catalog::build(&input).unwrap_err();
        assert!(err.to_string().contains("not offered"));
    }

    #[test]
    fn test_room_fit_checks_type_and_capacity() {
        let mut small_lab = room("L1", true);
        small_lab.max_capacity = 10;
        let mut lab_course = course("IT21002", "IT", 0, 2);
        lab_course.expected_enrollment = Some(20);
        let catalog = Catalog::build(&input(
            vec![],
            vec![lab_course, course("IT20001", "IT", 3, 0)],
            vec![small_lab, room("L2", true), room("R1", false)],
        ))
        .unwrap();
        let lab = catalog.offering("IT21002").unwrap();
        let theory = catalog.offering("IT20001").unwrap();
        assert!(!catalog.room("L1").unwrap().fits(lab));
        assert!(catalog.room("L2").unwrap().fits(lab));
        assert!(!catalog.room("R1").unwrap().fits(lab));
        assert!(catalog.room("R1").unwrap().fits(theory));
    }

    #[test]
    fn test_year_from_code() {
        assert_eq!(year_from_code("CS23123"), Some(2));
        assert_eq!(year_from_code("MA10001"), Some(1));
        assert_eq!(year_from_code("PH05"), None);
        assert_eq!(year_from_code("ELECTIVE"), None);
    }

    #[test]
    fn test_cohort_groups_need_two_members() {
        let catalog = Catalog::build(&input(
            vec![],
            vec![
                course("IT20001", "IT", 3, 0),
                course("IT20002", "IT", 3, 0),
                course("IT30001", "IT", 3, 0),
            ],
            vec![],
        ))
        .unwrap();
        let groups = catalog.cohort_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[&("IT".to_string(), 2)], vec![0, 1]);
    }
}
