use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::path::PathBuf;

use crate::models::{
    BudgetLine, Course, CourseAssignment, Expense, Instructor, InstructorPayment, Member,
    MemberDistribution, MonthlyFinancial, Student, StudentPayment,
};

pub struct Database {
    conn: Connection,
    path: PathBuf,
}

impl Database {
    pub fn open() -> Result<Self> {
        let path = Self::default_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&path)?;
        Ok(Self { conn, path })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn default_path() -> Result<PathBuf> {
        // Use XDG data directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "coopledger") {
            Ok(proj_dirs.data_dir().join("coopledger.db"))
        } else {
            // Fallback to current directory
            Ok(PathBuf::from("coopledger.db"))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS instructors (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive', 'on_leave')),
                hourly_rate TEXT NOT NULL,
                tax_rate_percentage TEXT NOT NULL DEFAULT '0',
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('pending', 'active', 'completed', 'cancelled')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS course_assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL REFERENCES courses(id),
                instructor_id INTEGER NOT NULL REFERENCES instructors(id),
                hours_taught TEXT NOT NULL DEFAULT '0',
                is_primary INTEGER NOT NULL DEFAULT 0,
                UNIQUE (course_id, instructor_id)
            );

            CREATE TABLE IF NOT EXISTS students (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive', 'graduated')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS enrollments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL REFERENCES students(id),
                course_id INTEGER NOT NULL REFERENCES courses(id),
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'completed', 'dropped')),
                UNIQUE (student_id, course_id)
            );

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id INTEGER NOT NULL REFERENCES students(id),
                amount TEXT NOT NULL,
                amount_paid TEXT NOT NULL DEFAULT '0',
                due_date TEXT NOT NULL,
                payment_date TEXT,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'partially_paid', 'paid', 'cancelled', 'refunded'))
            );

            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL CHECK (category IN ('rent', 'utilities', 'supplies', 'marketing', 'maintenance', 'insurance', 'salaries', 'taxes', 'other')),
                description TEXT NOT NULL,
                amount TEXT NOT NULL,
                expense_date TEXT NOT NULL,
                period_month TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'paid', 'rejected'))
            );

            CREATE TABLE IF NOT EXISTS members (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                share_percentage TEXT NOT NULL,
                employment_status TEXT NOT NULL CHECK (employment_status IN ('public', 'private', 'self_employed', 'unemployed')),
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive', 'suspended')),
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS instructor_payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instructor_id INTEGER NOT NULL REFERENCES instructors(id),
                period_month TEXT NOT NULL,
                total_hours TEXT NOT NULL,
                hourly_rate TEXT NOT NULL,
                gross_amount TEXT NOT NULL DEFAULT '0',
                tax_amount TEXT NOT NULL DEFAULT '0',
                net_amount TEXT NOT NULL DEFAULT '0',
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'paid', 'cancelled')),
                payment_date TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE (instructor_id, period_month)
            );

            CREATE TABLE IF NOT EXISTS monthly_financials (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                period_month TEXT NOT NULL UNIQUE,
                total_revenue TEXT NOT NULL DEFAULT '0',
                instructor_payments TEXT NOT NULL DEFAULT '0',
                operational_expenses TEXT NOT NULL DEFAULT '0',
                other_expenses TEXT NOT NULL DEFAULT '0',
                total_expenses TEXT NOT NULL DEFAULT '0',
                gross_profit TEXT NOT NULL DEFAULT '0',
                retained_earnings TEXT NOT NULL DEFAULT '0',
                distributable_profit TEXT NOT NULL DEFAULT '0',
                is_finalized INTEGER NOT NULL DEFAULT 0,
                finalized_date TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS member_distributions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                member_id INTEGER NOT NULL REFERENCES members(id),
                monthly_financial_id INTEGER NOT NULL REFERENCES monthly_financials(id),
                share_percentage TEXT NOT NULL,
                amount TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'approved', 'paid', 'cancelled')),
                is_public_employee INTEGER NOT NULL DEFAULT 0,
                payment_date TEXT,
                UNIQUE (member_id, monthly_financial_id)
            );

            CREATE TABLE IF NOT EXISTS budget_allocations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                period_month TEXT NOT NULL,
                category TEXT NOT NULL CHECK (category IN ('rent', 'utilities', 'supplies', 'marketing', 'maintenance', 'insurance', 'salaries', 'taxes', 'other')),
                allocated_amount TEXT NOT NULL,
                UNIQUE (period_month, category)
            );

            CREATE INDEX IF NOT EXISTS idx_assignments_instructor ON course_assignments(instructor_id);
            CREATE INDEX IF NOT EXISTS idx_payments_status ON payments(status);
            CREATE INDEX IF NOT EXISTS idx_payments_date ON payments(payment_date);
            CREATE INDEX IF NOT EXISTS idx_expenses_period ON expenses(period_month);
            CREATE INDEX IF NOT EXISTS idx_instructor_payments_period ON instructor_payments(period_month);
            CREATE INDEX IF NOT EXISTS idx_distributions_financial ON member_distributions(monthly_financial_id);
            "#,
        )?;
        Ok(())
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        let tables: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='monthly_financials'",
            [],
            |row| row.get(0),
        )?;
        if tables == 0 {
            return Err(anyhow!(
                "Database not initialized. Run 'coopledger init' first."
            ));
        }
        Ok(())
    }

    // --- Instructor operations ---

    pub fn add_instructor(
        &self,
        full_name: &str,
        hourly_rate: Decimal,
        tax_rate_percentage: Decimal,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO instructors (full_name, hourly_rate, tax_rate_percentage)
             VALUES (?1, ?2, ?3)",
            params![
                full_name,
                hourly_rate.to_string(),
                tax_rate_percentage.to_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_instructors(&self, status: Option<&str>) -> Result<Vec<Instructor>> {
        let mut sql = String::from(
            "SELECT id, full_name, status, hourly_rate, tax_rate_percentage, created_at, updated_at
             FROM instructors",
        );
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY full_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_instructor)?
        } else {
            stmt.query_map([], Self::row_to_instructor)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list instructors")
    }

    pub fn active_instructors(&self) -> Result<Vec<Instructor>> {
        self.list_instructors(Some("active"))
    }

    pub fn set_instructor_rate(&self, id: i64, hourly_rate: Decimal) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE instructors SET hourly_rate = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![hourly_rate.to_string(), id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Instructor #{} not found", id));
        }
        Ok(())
    }

    pub fn set_instructor_status(&self, id: i64, status: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE instructors SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Instructor #{} not found", id));
        }
        Ok(())
    }

    fn row_to_instructor(row: &rusqlite::Row) -> rusqlite::Result<Instructor> {
        Ok(Instructor {
            id: row.get(0)?,
            full_name: row.get(1)?,
            status: row.get(2)?,
            hourly_rate: get_decimal(row, 3)?,
            tax_rate_percentage: get_decimal(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    // --- Course and assignment operations ---

    pub fn add_course(&self, name: &str, start_date: NaiveDate, end_date: NaiveDate) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO courses (name, start_date, end_date) VALUES (?1, ?2, ?3)",
            params![name, start_date.to_string(), end_date.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_courses(&self, status: Option<&str>) -> Result<Vec<Course>> {
        let mut sql =
            String::from("SELECT id, name, start_date, end_date, status, created_at FROM courses");
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY start_date DESC, name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_course)?
        } else {
            stmt.query_map([], Self::row_to_course)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list courses")
    }

    fn row_to_course(row: &rusqlite::Row) -> rusqlite::Result<Course> {
        Ok(Course {
            id: row.get(0)?,
            name: row.get(1)?,
            start_date: get_date(row, 2)?,
            end_date: get_date(row, 3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn assign_instructor(
        &self,
        course_id: i64,
        instructor_id: i64,
        is_primary: bool,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO course_assignments (course_id, instructor_id, is_primary)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (course_id, instructor_id) DO UPDATE SET
               is_primary = excluded.is_primary",
            params![course_id, instructor_id, is_primary],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM course_assignments WHERE course_id = ?1 AND instructor_id = ?2",
            params![course_id, instructor_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Adds taught hours to an existing course assignment. Hours accumulate;
    /// course administration reports them incrementally.
    pub fn log_hours(&self, course_id: i64, instructor_id: i64, hours: Decimal) -> Result<Decimal> {
        let current: String = self
            .conn
            .query_row(
                "SELECT hours_taught FROM course_assignments
                 WHERE course_id = ?1 AND instructor_id = ?2",
                params![course_id, instructor_id],
                |row| row.get(0),
            )
            .with_context(|| {
                format!(
                    "Instructor #{} is not assigned to course #{}",
                    instructor_id, course_id
                )
            })?;
        let total = current.parse::<Decimal>().context("Corrupt hours value")? + hours;
        self.conn.execute(
            "UPDATE course_assignments SET hours_taught = ?1
             WHERE course_id = ?2 AND instructor_id = ?3",
            params![total.to_string(), course_id, instructor_id],
        )?;
        Ok(total)
    }

    pub fn list_assignments(&self, course_id: Option<i64>) -> Result<Vec<CourseAssignment>> {
        let mut sql = String::from(
            "SELECT a.id, a.course_id, c.name, a.instructor_id, i.full_name, a.hours_taught, a.is_primary
             FROM course_assignments a
             JOIN courses c ON a.course_id = c.id
             JOIN instructors i ON a.instructor_id = i.id",
        );
        if course_id.is_some() {
            sql.push_str(" WHERE a.course_id = ?1");
        }
        sql.push_str(" ORDER BY a.is_primary DESC, i.full_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(id) = course_id {
            stmt.query_map([id], Self::row_to_assignment)?
        } else {
            stmt.query_map([], Self::row_to_assignment)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list assignments")
    }

    fn row_to_assignment(row: &rusqlite::Row) -> rusqlite::Result<CourseAssignment> {
        Ok(CourseAssignment {
            id: row.get(0)?,
            course_id: row.get(1)?,
            course_name: row.get(2)?,
            instructor_id: row.get(3)?,
            instructor_name: row.get(4)?,
            hours_taught: get_decimal(row, 5)?,
            is_primary: row.get(6)?,
        })
    }

    /// Total hours an instructor taught across assignments whose course
    /// interval intersects [first, last]. Decimal columns are stored as
    /// text, so the sum happens in Rust rather than SQL.
    pub fn hours_taught_between(
        &self,
        instructor_id: i64,
        first: NaiveDate,
        last: NaiveDate,
    ) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT a.hours_taught
             FROM course_assignments a
             JOIN courses c ON a.course_id = c.id
             WHERE a.instructor_id = ?1 AND c.start_date <= ?2 AND c.end_date >= ?3",
        )?;
        let rows = stmt.query_map(
            params![instructor_id, last.to_string(), first.to_string()],
            |row| get_decimal(row, 0),
        )?;
        let mut total = Decimal::ZERO;
        for hours in rows {
            total += hours?;
        }
        Ok(total)
    }

    // --- Student and enrollment operations ---

    pub fn add_student(&self, full_name: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO students (full_name) VALUES (?1)",
            params![full_name],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_students(&self, status: Option<&str>) -> Result<Vec<Student>> {
        let mut sql = String::from("SELECT id, full_name, status, created_at FROM students");
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY full_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_student)?
        } else {
            stmt.query_map([], Self::row_to_student)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list students")
    }

    fn row_to_student(row: &rusqlite::Row) -> rusqlite::Result<Student> {
        Ok(Student {
            id: row.get(0)?,
            full_name: row.get(1)?,
            status: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    pub fn enroll_student(&self, student_id: i64, course_id: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO enrollments (student_id, course_id) VALUES (?1, ?2)
             ON CONFLICT (student_id, course_id) DO UPDATE SET status = 'active'",
            params![student_id, course_id],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM enrollments WHERE student_id = ?1 AND course_id = ?2",
            params![student_id, course_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    // --- Student payment operations ---

    pub fn add_payment(&self, student_id: i64, amount: Decimal, due_date: NaiveDate) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO payments (student_id, amount, due_date) VALUES (?1, ?2, ?3)",
            params![student_id, amount.to_string(), due_date.to_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_payment(&self, id: i64) -> Result<Option<StudentPayment>> {
        let result = self.conn.query_row(
            "SELECT p.id, p.student_id, s.full_name, p.amount, p.amount_paid,
                    p.due_date, p.payment_date, p.status
             FROM payments p
             JOIN students s ON p.student_id = s.id
             WHERE p.id = ?1",
            [id],
            Self::row_to_payment,
        );
        match result {
            Ok(payment) => Ok(Some(payment)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_payments(&self, status: Option<&str>) -> Result<Vec<StudentPayment>> {
        let mut sql = String::from(
            "SELECT p.id, p.student_id, s.full_name, p.amount, p.amount_paid,
                    p.due_date, p.payment_date, p.status
             FROM payments p
             JOIN students s ON p.student_id = s.id",
        );
        if status.is_some() {
            sql.push_str(" WHERE p.status = ?1");
        }
        sql.push_str(" ORDER BY p.due_date DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_payment)?
        } else {
            stmt.query_map([], Self::row_to_payment)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list payments")
    }

    /// Records money received against a payment. A full amount settles the
    /// payment; anything less leaves it partially paid.
    pub fn mark_payment_paid(
        &self,
        id: i64,
        amount: Option<Decimal>,
        payment_date: NaiveDate,
    ) -> Result<StudentPayment> {
        let payment = self
            .get_payment(id)?
            .ok_or_else(|| anyhow!("Payment #{} not found", id))?;
        let paid = amount.unwrap_or(payment.amount);
        let status = if paid >= payment.amount {
            "paid"
        } else if paid > Decimal::ZERO {
            "partially_paid"
        } else {
            "pending"
        };
        self.conn.execute(
            "UPDATE payments SET amount_paid = ?1, payment_date = ?2, status = ?3 WHERE id = ?4",
            params![paid.to_string(), payment_date.to_string(), status, id],
        )?;
        self.get_payment(id)?
            .ok_or_else(|| anyhow!("Payment #{} disappeared during update", id))
    }

    fn row_to_payment(row: &rusqlite::Row) -> rusqlite::Result<StudentPayment> {
        Ok(StudentPayment {
            id: row.get(0)?,
            student_id: row.get(1)?,
            student_name: row.get(2)?,
            amount: get_decimal(row, 3)?,
            amount_paid: get_decimal(row, 4)?,
            due_date: get_date(row, 5)?,
            payment_date: get_opt_date(row, 6)?,
            status: row.get(7)?,
        })
    }

    /// Sum of amounts received on paid payments dated within [first, last].
    pub fn revenue_between(&self, first: NaiveDate, last: NaiveDate) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT amount_paid FROM payments
             WHERE status = 'paid' AND payment_date >= ?1 AND payment_date <= ?2",
        )?;
        let rows = stmt.query_map(params![first.to_string(), last.to_string()], |row| {
            get_decimal(row, 0)
        })?;
        let mut total = Decimal::ZERO;
        for amount in rows {
            total += amount?;
        }
        Ok(total)
    }

    /// Pending payments due on or before the given date: (count, total amount).
    pub fn pending_overdue_payments(&self, today: NaiveDate) -> Result<(i64, Decimal)> {
        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM payments WHERE status = 'pending' AND due_date <= ?1")?;
        let rows = stmt.query_map([today.to_string()], |row| get_decimal(row, 0))?;
        let mut count = 0;
        let mut total = Decimal::ZERO;
        for amount in rows {
            count += 1;
            total += amount?;
        }
        Ok((count, total))
    }

    // --- Expense operations ---

    pub fn add_expense(
        &self,
        category: &str,
        description: &str,
        amount: Decimal,
        expense_date: NaiveDate,
        period_month: NaiveDate,
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO expenses (category, description, amount, expense_date, period_month)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                category,
                description,
                amount.to_string(),
                expense_date.to_string(),
                period_month.to_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_expense_status(&self, id: i64, status: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE expenses SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Expense #{} not found", id));
        }
        Ok(())
    }

    pub fn list_expenses(&self, period_month: Option<NaiveDate>) -> Result<Vec<Expense>> {
        let mut sql = String::from(
            "SELECT id, category, description, amount, expense_date, period_month, status
             FROM expenses",
        );
        if period_month.is_some() {
            sql.push_str(" WHERE period_month = ?1");
        }
        sql.push_str(" ORDER BY expense_date DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(p) = period_month {
            stmt.query_map([p.to_string()], Self::row_to_expense)?
        } else {
            stmt.query_map([], Self::row_to_expense)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list expenses")
    }

    fn row_to_expense(row: &rusqlite::Row) -> rusqlite::Result<Expense> {
        Ok(Expense {
            id: row.get(0)?,
            category: row.get(1)?,
            description: row.get(2)?,
            amount: get_decimal(row, 3)?,
            expense_date: get_date(row, 4)?,
            period_month: get_date(row, 5)?,
            status: row.get(6)?,
        })
    }

    /// Sum of paid expenses assigned to the period.
    pub fn operational_expenses_for(&self, period_month: NaiveDate) -> Result<Decimal> {
        self.sum_expenses(period_month, None)
    }

    fn sum_expenses(&self, period_month: NaiveDate, category: Option<&str>) -> Result<Decimal> {
        let mut sql =
            String::from("SELECT amount FROM expenses WHERE period_month = ?1 AND status = 'paid'");
        if category.is_some() {
            sql.push_str(" AND category = ?2");
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let map_amount = |row: &rusqlite::Row| get_decimal(row, 0);
        let rows = if let Some(c) = category {
            stmt.query_map(params![period_month.to_string(), c], map_amount)?
        } else {
            stmt.query_map(params![period_month.to_string()], map_amount)?
        };
        let mut total = Decimal::ZERO;
        for amount in rows {
            total += amount?;
        }
        Ok(total)
    }

    // --- Member operations ---

    pub fn add_member(
        &self,
        full_name: &str,
        share_percentage: Decimal,
        employment_status: &str,
    ) -> Result<i64> {
        // Shares are absolute percentages of the distributable pool
        if share_percentage < Decimal::ZERO || share_percentage > Decimal::ONE_HUNDRED {
            return Err(anyhow!(
                "Share percentage must be between 0 and 100, got {}",
                share_percentage
            ));
        }
        self.conn.execute(
            "INSERT INTO members (full_name, share_percentage, employment_status)
             VALUES (?1, ?2, ?3)",
            params![full_name, share_percentage.to_string(), employment_status],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_members(&self, status: Option<&str>) -> Result<Vec<Member>> {
        let mut sql = String::from(
            "SELECT id, full_name, share_percentage, employment_status, status, created_at
             FROM members",
        );
        if status.is_some() {
            sql.push_str(" WHERE status = ?1");
        }
        sql.push_str(" ORDER BY full_name");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = if let Some(s) = status {
            stmt.query_map([s], Self::row_to_member)?
        } else {
            stmt.query_map([], Self::row_to_member)?
        };

        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list members")
    }

    pub fn active_members(&self) -> Result<Vec<Member>> {
        self.list_members(Some("active"))
    }

    pub fn set_member_status(&self, id: i64, status: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE members SET status = ?1 WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Member #{} not found", id));
        }
        Ok(())
    }

    fn row_to_member(row: &rusqlite::Row) -> rusqlite::Result<Member> {
        Ok(Member {
            id: row.get(0)?,
            full_name: row.get(1)?,
            share_percentage: get_decimal(row, 2)?,
            employment_status: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // --- Instructor payment aggregates ---

    /// Create-or-overwrite keyed by (instructor, period). Recalculation
    /// resets the row to pending with fresh figures; the single statement
    /// keeps the row unique under concurrent callers.
    #[allow(clippy::too_many_arguments)]
    pub fn upsert_instructor_payment(
        &self,
        instructor_id: i64,
        period_month: NaiveDate,
        total_hours: Decimal,
        hourly_rate: Decimal,
        gross_amount: Decimal,
        tax_amount: Decimal,
        net_amount: Decimal,
    ) -> Result<InstructorPayment> {
        self.conn.execute(
            "INSERT INTO instructor_payments
               (instructor_id, period_month, total_hours, hourly_rate,
                gross_amount, tax_amount, net_amount, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending')
             ON CONFLICT (instructor_id, period_month) DO UPDATE SET
               total_hours = excluded.total_hours,
               hourly_rate = excluded.hourly_rate,
               gross_amount = excluded.gross_amount,
               tax_amount = excluded.tax_amount,
               net_amount = excluded.net_amount,
               status = 'pending',
               payment_date = NULL,
               updated_at = datetime('now')",
            params![
                instructor_id,
                period_month.to_string(),
                total_hours.to_string(),
                hourly_rate.to_string(),
                gross_amount.to_string(),
                tax_amount.to_string(),
                net_amount.to_string()
            ],
        )?;
        self.get_instructor_payment(instructor_id, period_month)?
            .ok_or_else(|| anyhow!("Instructor payment missing after upsert"))
    }

    pub fn get_instructor_payment(
        &self,
        instructor_id: i64,
        period_month: NaiveDate,
    ) -> Result<Option<InstructorPayment>> {
        let result = self.conn.query_row(
            "SELECT p.id, p.instructor_id, i.full_name, p.period_month, p.total_hours,
                    p.hourly_rate, p.gross_amount, p.tax_amount, p.net_amount,
                    p.status, p.payment_date, p.created_at, p.updated_at
             FROM instructor_payments p
             JOIN instructors i ON p.instructor_id = i.id
             WHERE p.instructor_id = ?1 AND p.period_month = ?2",
            params![instructor_id, period_month.to_string()],
            Self::row_to_instructor_payment,
        );
        match result {
            Ok(payment) => Ok(Some(payment)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn list_instructor_payments(
        &self,
        period_month: NaiveDate,
    ) -> Result<Vec<InstructorPayment>> {
        let mut stmt = self.conn.prepare(
            "SELECT p.id, p.instructor_id, i.full_name, p.period_month, p.total_hours,
                    p.hourly_rate, p.gross_amount, p.tax_amount, p.net_amount,
                    p.status, p.payment_date, p.created_at, p.updated_at
             FROM instructor_payments p
             JOIN instructors i ON p.instructor_id = i.id
             WHERE p.period_month = ?1
             ORDER BY i.full_name",
        )?;
        let rows = stmt.query_map([period_month.to_string()], Self::row_to_instructor_payment)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list instructor payments")
    }

    pub fn set_instructor_payment_status(&self, id: i64, status: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE instructor_payments SET
               status = ?1,
               payment_date = CASE WHEN ?1 = 'paid' THEN date('now') ELSE payment_date END,
               updated_at = datetime('now')
             WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Instructor payment #{} not found", id));
        }
        Ok(())
    }

    /// Settled instructor pay for the month: net amounts with status
    /// approved or paid. Pending figures are provisional and excluded.
    pub fn instructor_payments_total(&self, period_month: NaiveDate) -> Result<Decimal> {
        let mut stmt = self.conn.prepare(
            "SELECT net_amount FROM instructor_payments
             WHERE period_month = ?1 AND status IN ('approved', 'paid')",
        )?;
        let rows = stmt.query_map([period_month.to_string()], |row| get_decimal(row, 0))?;
        let mut total = Decimal::ZERO;
        for amount in rows {
            total += amount?;
        }
        Ok(total)
    }

    fn row_to_instructor_payment(row: &rusqlite::Row) -> rusqlite::Result<InstructorPayment> {
        Ok(InstructorPayment {
            id: row.get(0)?,
            instructor_id: row.get(1)?,
            instructor_name: row.get(2)?,
            period_month: get_date(row, 3)?,
            total_hours: get_decimal(row, 4)?,
            hourly_rate: get_decimal(row, 5)?,
            gross_amount: get_decimal(row, 6)?,
            tax_amount: get_decimal(row, 7)?,
            net_amount: get_decimal(row, 8)?,
            status: row.get(9)?,
            payment_date: get_opt_date(row, 10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    // --- Monthly financial summary ---

    #[allow(clippy::too_many_arguments)]
    pub fn upsert_monthly_financial(
        &self,
        period_month: NaiveDate,
        total_revenue: Decimal,
        instructor_payments: Decimal,
        operational_expenses: Decimal,
        other_expenses: Decimal,
        total_expenses: Decimal,
        gross_profit: Decimal,
        retained_earnings: Decimal,
        distributable_profit: Decimal,
    ) -> Result<MonthlyFinancial> {
        self.conn.execute(
            "INSERT INTO monthly_financials
               (period_month, total_revenue, instructor_payments, operational_expenses,
                other_expenses, total_expenses, gross_profit, retained_earnings,
                distributable_profit)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (period_month) DO UPDATE SET
               total_revenue = excluded.total_revenue,
               instructor_payments = excluded.instructor_payments,
               operational_expenses = excluded.operational_expenses,
               other_expenses = excluded.other_expenses,
               total_expenses = excluded.total_expenses,
               gross_profit = excluded.gross_profit,
               retained_earnings = excluded.retained_earnings,
               distributable_profit = excluded.distributable_profit,
               updated_at = datetime('now')",
            params![
                period_month.to_string(),
                total_revenue.to_string(),
                instructor_payments.to_string(),
                operational_expenses.to_string(),
                other_expenses.to_string(),
                total_expenses.to_string(),
                gross_profit.to_string(),
                retained_earnings.to_string(),
                distributable_profit.to_string()
            ],
        )?;
        self.get_monthly_financial(period_month)?
            .ok_or_else(|| anyhow!("Monthly summary missing after upsert"))
    }

    pub fn get_monthly_financial(
        &self,
        period_month: NaiveDate,
    ) -> Result<Option<MonthlyFinancial>> {
        let result = self.conn.query_row(
            "SELECT id, period_month, total_revenue, instructor_payments, operational_expenses,
                    other_expenses, total_expenses, gross_profit, retained_earnings,
                    distributable_profit, is_finalized, finalized_date, created_at, updated_at
             FROM monthly_financials WHERE period_month = ?1",
            [period_month.to_string()],
            Self::row_to_monthly_financial,
        );
        match result {
            Ok(summary) => Ok(Some(summary)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Locks a month's settlement. Finalized summaries reject recalculation.
    pub fn finalize_month(
        &self,
        period_month: NaiveDate,
        on: NaiveDate,
    ) -> Result<MonthlyFinancial> {
        let summary = self.get_monthly_financial(period_month)?.ok_or_else(|| {
            anyhow!("No financial summary for {}. Run 'settle' first.", period_month)
        })?;
        if summary.is_finalized {
            return Err(anyhow!(
                "Financial summary for {} is already finalized",
                period_month.format("%B %Y")
            ));
        }
        self.conn.execute(
            "UPDATE monthly_financials SET is_finalized = 1, finalized_date = ?1,
               updated_at = datetime('now')
             WHERE id = ?2",
            params![on.to_string(), summary.id],
        )?;
        self.get_monthly_financial(period_month)?
            .ok_or_else(|| anyhow!("Monthly summary missing after finalize"))
    }

    fn row_to_monthly_financial(row: &rusqlite::Row) -> rusqlite::Result<MonthlyFinancial> {
        Ok(MonthlyFinancial {
            id: row.get(0)?,
            period_month: get_date(row, 1)?,
            total_revenue: get_decimal(row, 2)?,
            instructor_payments: get_decimal(row, 3)?,
            operational_expenses: get_decimal(row, 4)?,
            other_expenses: get_decimal(row, 5)?,
            total_expenses: get_decimal(row, 6)?,
            gross_profit: get_decimal(row, 7)?,
            retained_earnings: get_decimal(row, 8)?,
            distributable_profit: get_decimal(row, 9)?,
            is_finalized: row.get(10)?,
            finalized_date: get_opt_date(row, 11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    // --- Member distributions ---

    pub fn upsert_member_distribution(
        &self,
        member_id: i64,
        monthly_financial_id: i64,
        share_percentage: Decimal,
        amount: Decimal,
        status: &str,
        is_public_employee: bool,
    ) -> Result<MemberDistribution> {
        self.conn.execute(
            "INSERT INTO member_distributions
               (member_id, monthly_financial_id, share_percentage, amount, status, is_public_employee)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (member_id, monthly_financial_id) DO UPDATE SET
               share_percentage = excluded.share_percentage,
               amount = excluded.amount,
               status = excluded.status,
               is_public_employee = excluded.is_public_employee",
            params![
                member_id,
                monthly_financial_id,
                share_percentage.to_string(),
                amount.to_string(),
                status,
                is_public_employee
            ],
        )?;
        let result = self.conn.query_row(
            "SELECT d.id, d.member_id, m.full_name, d.monthly_financial_id, d.share_percentage,
                    d.amount, d.status, d.is_public_employee, d.payment_date
             FROM member_distributions d
             JOIN members m ON d.member_id = m.id
             WHERE d.member_id = ?1 AND d.monthly_financial_id = ?2",
            params![member_id, monthly_financial_id],
            Self::row_to_distribution,
        )?;
        Ok(result)
    }

    pub fn list_member_distributions(
        &self,
        monthly_financial_id: i64,
    ) -> Result<Vec<MemberDistribution>> {
        let mut stmt = self.conn.prepare(
            "SELECT d.id, d.member_id, m.full_name, d.monthly_financial_id, d.share_percentage,
                    d.amount, d.status, d.is_public_employee, d.payment_date
             FROM member_distributions d
             JOIN members m ON d.member_id = m.id
             WHERE d.monthly_financial_id = ?1
             ORDER BY m.full_name",
        )?;
        let rows = stmt.query_map([monthly_financial_id], Self::row_to_distribution)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list distributions")
    }

    pub fn set_distribution_status(&self, id: i64, status: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE member_distributions SET
               status = ?1,
               payment_date = CASE WHEN ?1 = 'paid' THEN date('now') ELSE payment_date END
             WHERE id = ?2",
            params![status, id],
        )?;
        if changed == 0 {
            return Err(anyhow!("Distribution #{} not found", id));
        }
        Ok(())
    }

    fn row_to_distribution(row: &rusqlite::Row) -> rusqlite::Result<MemberDistribution> {
        Ok(MemberDistribution {
            id: row.get(0)?,
            member_id: row.get(1)?,
            member_name: row.get(2)?,
            monthly_financial_id: row.get(3)?,
            share_percentage: get_decimal(row, 4)?,
            amount: get_decimal(row, 5)?,
            status: row.get(6)?,
            is_public_employee: row.get(7)?,
            payment_date: get_opt_date(row, 8)?,
        })
    }

    // --- KPI counts ---

    pub fn count_active_students(&self) -> Result<i64> {
        self.count_where("students", "status = 'active'")
    }

    pub fn count_active_courses(&self) -> Result<i64> {
        self.count_where("courses", "status = 'active'")
    }

    pub fn count_active_enrollments(&self) -> Result<i64> {
        self.count_where("enrollments", "status = 'active'")
    }

    fn count_where(&self, table: &str, predicate: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", table, predicate);
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    // --- Budget allocations ---

    pub fn set_budget(
        &self,
        period_month: NaiveDate,
        category: &str,
        allocated_amount: Decimal,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT INTO budget_allocations (period_month, category, allocated_amount)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (period_month, category) DO UPDATE SET
               allocated_amount = excluded.allocated_amount",
            params![
                period_month.to_string(),
                category,
                allocated_amount.to_string()
            ],
        )?;
        Ok(())
    }

    /// Allocation vs. paid spending per category for the period.
    pub fn budget_report(&self, period_month: NaiveDate) -> Result<Vec<BudgetLine>> {
        let mut stmt = self.conn.prepare(
            "SELECT category, allocated_amount FROM budget_allocations
             WHERE period_month = ?1 ORDER BY category",
        )?;
        let allocations = stmt
            .query_map([period_month.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, get_decimal(row, 1)?))
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read budget allocations")?;

        let mut lines = Vec::new();
        for (category, allocated) in allocations {
            let spent = self.sum_expenses(period_month, Some(&category))?;
            let utilization = if allocated > Decimal::ZERO {
                (spent / allocated * Decimal::ONE_HUNDRED).round_dp(2)
            } else {
                Decimal::ZERO
            };
            lines.push(BudgetLine {
                category,
                allocated_amount: allocated,
                spent_amount: spent,
                remaining_budget: allocated - spent,
                utilization_percentage: utilization,
            });
        }
        Ok(lines)
    }
}

// --- Column conversion helpers ---

fn get_decimal(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    text.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn get_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn get_opt_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(t) => NaiveDate::parse_from_str(&t, "%Y-%m-%d")
            .map(Some)
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        db
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_mark_payment_paid_full_settles() {
        let db = test_db();
        let student = db.add_student("Amina Alaoui").unwrap();
        let id = db
            .add_payment(student, dec("1200"), date(2026, 8, 15))
            .unwrap();

        let payment = db.mark_payment_paid(id, None, date(2026, 8, 10)).unwrap();
        assert_eq!(payment.status, "paid");
        assert_eq!(payment.amount_paid, dec("1200"));
        assert_eq!(payment.payment_date, Some(date(2026, 8, 10)));
    }

    #[test]
    fn test_mark_payment_paid_partial() {
        let db = test_db();
        let student = db.add_student("Karim Bennis").unwrap();
        let id = db
            .add_payment(student, dec("1000"), date(2026, 8, 15))
            .unwrap();

        let payment = db
            .mark_payment_paid(id, Some(dec("400")), date(2026, 8, 10))
            .unwrap();
        assert_eq!(payment.status, "partially_paid");
        assert_eq!(payment.amount_paid, dec("400"));

        // Partial payments do not count as revenue
        let revenue = db
            .revenue_between(date(2026, 8, 1), date(2026, 8, 31))
            .unwrap();
        assert_eq!(revenue, Decimal::ZERO);
    }

    #[test]
    fn test_log_hours_accumulates() {
        let db = test_db();
        let instructor = db
            .add_instructor("Sara Idrissi", dec("150"), dec("10"))
            .unwrap();
        let course = db
            .add_course("Calculus I", date(2026, 8, 1), date(2026, 10, 31))
            .unwrap();
        db.assign_instructor(course, instructor, true).unwrap();

        assert_eq!(
            db.log_hours(course, instructor, dec("12.5")).unwrap(),
            dec("12.5")
        );
        assert_eq!(
            db.log_hours(course, instructor, dec("7.5")).unwrap(),
            dec("20")
        );

        let hours = db
            .hours_taught_between(instructor, date(2026, 8, 1), date(2026, 8, 31))
            .unwrap();
        assert_eq!(hours, dec("20"));
    }

    #[test]
    fn test_hours_exclude_courses_outside_window() {
        let db = test_db();
        let instructor = db
            .add_instructor("Sara Idrissi", dec("150"), dec("10"))
            .unwrap();
        let past = db
            .add_course("Spring Workshop", date(2026, 2, 1), date(2026, 4, 30))
            .unwrap();
        db.assign_instructor(past, instructor, true).unwrap();
        db.log_hours(past, instructor, dec("30")).unwrap();

        let hours = db
            .hours_taught_between(instructor, date(2026, 8, 1), date(2026, 8, 31))
            .unwrap();
        assert_eq!(hours, Decimal::ZERO);
    }

    #[test]
    fn test_instructor_payment_upsert_updates_in_place() {
        let db = test_db();
        let instructor = db.add_instructor("Omar Tazi", dec("100"), dec("0")).unwrap();
        let month = date(2026, 8, 1);

        let first = db
            .upsert_instructor_payment(
                instructor,
                month,
                dec("10"),
                dec("100"),
                dec("1000.00"),
                dec("0.00"),
                dec("1000.00"),
            )
            .unwrap();
        db.set_instructor_payment_status(first.id, "approved")
            .unwrap();

        let second = db
            .upsert_instructor_payment(
                instructor,
                month,
                dec("12"),
                dec("100"),
                dec("1200.00"),
                dec("0.00"),
                dec("1200.00"),
            )
            .unwrap();

        // Same row, overwritten figures, status reset to pending
        assert_eq!(second.id, first.id);
        assert_eq!(second.total_hours, dec("12"));
        assert_eq!(second.status, "pending");
        assert_eq!(db.list_instructor_payments(month).unwrap().len(), 1);
    }

    #[test]
    fn test_pending_overdue_payments() {
        let db = test_db();
        let student = db.add_student("Leila Chraibi").unwrap();
        db.add_payment(student, dec("500"), date(2026, 8, 1)).unwrap();
        db.add_payment(student, dec("700"), date(2026, 8, 20))
            .unwrap();
        let paid = db
            .add_payment(student, dec("300"), date(2026, 8, 5))
            .unwrap();
        db.mark_payment_paid(paid, None, date(2026, 8, 5)).unwrap();

        let (count, total) = db.pending_overdue_payments(date(2026, 8, 10)).unwrap();
        assert_eq!(count, 1);
        assert_eq!(total, dec("500"));
    }

    #[test]
    fn test_budget_report() {
        let db = test_db();
        let month = date(2026, 8, 1);
        db.set_budget(month, "rent", dec("8000")).unwrap();
        db.set_budget(month, "supplies", dec("1000")).unwrap();

        let rent = db
            .add_expense("rent", "August rent", dec("6000"), date(2026, 8, 3), month)
            .unwrap();
        db.set_expense_status(rent, "paid").unwrap();
        // Unpaid expenses do not count as spending
        db.add_expense("supplies", "Whiteboards", dec("400"), date(2026, 8, 9), month)
            .unwrap();

        let report = db.budget_report(month).unwrap();
        assert_eq!(report.len(), 2);

        let rent_line = &report[0];
        assert_eq!(rent_line.category, "rent");
        assert_eq!(rent_line.spent_amount, dec("6000"));
        assert_eq!(rent_line.remaining_budget, dec("2000"));
        assert_eq!(rent_line.utilization_percentage, dec("75.00"));

        let supplies_line = &report[1];
        assert_eq!(supplies_line.spent_amount, Decimal::ZERO);
        assert_eq!(supplies_line.remaining_budget, dec("1000"));
    }

    #[test]
    fn test_operational_expenses_sum_paid_across_categories() {
        let db = test_db();
        let month = date(2026, 8, 1);
        let rent = db
            .add_expense("rent", "August rent", dec("6000"), date(2026, 8, 3), month)
            .unwrap();
        db.set_expense_status(rent, "paid").unwrap();
        let supplies = db
            .add_expense("supplies", "Markers", dec("250"), date(2026, 8, 9), month)
            .unwrap();
        db.set_expense_status(supplies, "paid").unwrap();
        // Pending expenses and other months stay out of the total
        db.add_expense("other", "Misc", dec("999"), date(2026, 8, 12), month)
            .unwrap();
        let past = db
            .add_expense("rent", "July rent", dec("6000"), date(2026, 7, 3), date(2026, 7, 1))
            .unwrap();
        db.set_expense_status(past, "paid").unwrap();

        assert_eq!(db.operational_expenses_for(month).unwrap(), dec("6250"));
    }

    #[test]
    fn test_add_member_rejects_out_of_range_share() {
        let db = test_db();
        assert!(db.add_member("Nadia Berrada", dec("-10"), "private").is_err());
        assert!(db.add_member("Hassan Fassi", dec("250"), "private").is_err());
        assert!(db.list_members(None).unwrap().is_empty());

        // Boundary values are valid
        db.add_member("Youssef Lamrani", dec("0"), "private").unwrap();
        db.add_member("Leila Chraibi", dec("100"), "private").unwrap();
    }

    #[test]
    fn test_finalize_month_is_one_shot() {
        let db = test_db();
        let month = date(2026, 8, 1);
        db.upsert_monthly_financial(
            month,
            dec("1000"),
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            Decimal::ZERO,
            dec("1000"),
            dec("200"),
            dec("800"),
        )
        .unwrap();

        let summary = db.finalize_month(month, date(2026, 9, 5)).unwrap();
        assert!(summary.is_finalized);
        assert_eq!(summary.finalized_date, Some(date(2026, 9, 5)));
        assert!(db.finalize_month(month, date(2026, 9, 6)).is_err());
    }
}
