mod db;
mod finance;
mod models;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use db::Database;
use rust_decimal::Decimal;

#[derive(Parser)]
#[command(name = "coopledger")]
#[command(about = "Educational cooperative back office - registries, settlement, and profit distribution")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Manage instructors
    Instructor {
        #[command(subcommand)]
        command: InstructorCommands,
    },

    /// Manage courses and teaching assignments
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },

    /// Manage students
    Student {
        #[command(subcommand)]
        command: StudentCommands,
    },

    /// Manage student payments
    Payment {
        #[command(subcommand)]
        command: PaymentCommands,
    },

    /// Manage expenses
    Expense {
        #[command(subcommand)]
        command: ExpenseCommands,
    },

    /// Manage cooperative members
    Member {
        #[command(subcommand)]
        command: MemberCommands,
    },

    /// Instructor payroll for a period month
    Payroll {
        #[command(subcommand)]
        command: PayrollCommands,
    },

    /// Run the monthly settlement (revenue, expenses, profit split, distributions)
    Settle {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,

        /// Percentage of gross profit retained as reserves
        #[arg(short, long, default_value = "20")]
        retain: u32,
    },

    /// Lock a month's settlement against recalculation
    Finalize {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Show a month's financial summary
    Summary {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show dashboard KPIs
    Kpis {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Member profit distributions
    Distribution {
        #[command(subcommand)]
        command: DistributionCommands,
    },

    /// Monthly budget allocations
    Budget {
        #[command(subcommand)]
        command: BudgetCommands,
    },
}

#[derive(Subcommand)]
enum InstructorCommands {
    /// Add an instructor
    Add {
        /// Full name
        name: String,

        /// Hourly rate
        #[arg(short, long)]
        rate: Decimal,

        /// Tax rate percentage withheld from gross pay
        #[arg(short, long, default_value = "0")]
        tax: Decimal,
    },

    /// List instructors
    List {
        /// Filter by status (active, inactive, on_leave)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Change an instructor's hourly rate
    SetRate {
        /// Instructor ID
        id: i64,
        rate: Decimal,
    },

    /// Change an instructor's status
    SetStatus {
        /// Instructor ID
        id: i64,
        /// New status (active, inactive, on_leave)
        status: String,
    },
}

#[derive(Subcommand)]
enum CourseCommands {
    /// Add a course
    Add {
        /// Course name
        name: String,

        /// Start date (YYYY-MM-DD)
        #[arg(short, long)]
        start: NaiveDate,

        /// End date (YYYY-MM-DD)
        #[arg(short, long)]
        end: NaiveDate,
    },

    /// List courses
    List {
        /// Filter by status (pending, active, completed, cancelled)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Assign an instructor to a course
    Assign {
        /// Course ID
        course_id: i64,

        /// Instructor ID
        instructor_id: i64,

        /// Mark as primary instructor
        #[arg(long)]
        primary: bool,
    },

    /// Record taught hours against an assignment
    LogHours {
        /// Course ID
        course_id: i64,

        /// Instructor ID
        instructor_id: i64,

        /// Hours to add
        hours: Decimal,
    },
}

#[derive(Subcommand)]
enum StudentCommands {
    /// Add a student
    Add {
        /// Full name
        name: String,
    },

    /// List students
    List,

    /// Enroll a student in a course
    Enroll {
        /// Student ID
        student_id: i64,

        /// Course ID
        course_id: i64,
    },
}

#[derive(Subcommand)]
enum PaymentCommands {
    /// Add an expected payment
    Add {
        /// Student ID
        student_id: i64,

        /// Amount due
        amount: Decimal,

        /// Due date (YYYY-MM-DD)
        #[arg(short, long)]
        due: NaiveDate,
    },

    /// Record money received against a payment
    Pay {
        /// Payment ID
        id: i64,

        /// Amount received (defaults to the full amount due)
        #[arg(short, long)]
        amount: Option<Decimal>,

        /// Payment date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// List payments
    List {
        /// Filter by status (pending, partially_paid, paid, cancelled, refunded)
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[derive(Subcommand)]
enum ExpenseCommands {
    /// Add an expense
    Add {
        /// Category (rent, utilities, supplies, marketing, maintenance, insurance, salaries, taxes, other)
        category: String,

        /// Amount
        amount: Decimal,

        /// Financial month the expense is assigned to (YYYY-MM)
        #[arg(short, long)]
        month: String,

        /// Description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Expense date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Mark an expense as paid
    Pay {
        /// Expense ID
        id: i64,
    },

    /// List expenses
    List {
        /// Filter by period month (YYYY-MM)
        #[arg(short, long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
enum MemberCommands {
    /// Add a cooperative member
    Add {
        /// Full name
        name: String,

        /// Share percentage (0-100)
        share: Decimal,

        /// Employment status (public, private, self_employed, unemployed)
        #[arg(short, long)]
        employment: String,
    },

    /// List members
    List {
        /// Filter by status (active, inactive, suspended)
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Change a member's status
    SetStatus {
        /// Member ID
        id: i64,
        /// New status (active, inactive, suspended)
        status: String,
    },
}

#[derive(Subcommand)]
enum PayrollCommands {
    /// Compute instructor payments for a month
    Calc {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Approve a computed instructor payment
    Approve {
        /// Instructor payment ID
        id: i64,
    },

    /// Mark an instructor payment as paid out
    Pay {
        /// Instructor payment ID
        id: i64,
    },

    /// List instructor payments for a month
    List {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },
}

#[derive(Subcommand)]
enum DistributionCommands {
    /// List distributions for a month's settlement
    List {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Mark a distribution as paid out
    Pay {
        /// Distribution ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum BudgetCommands {
    /// Set a category's budget for a month
    Set {
        /// Category (rent, utilities, supplies, marketing, maintenance, insurance, salaries, taxes, other)
        category: String,

        /// Allocated amount
        amount: Decimal,

        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },

    /// Show allocation vs. spending for a month
    Report {
        /// Period month (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,
    },
}

fn parse_month(month: Option<&str>) -> Result<NaiveDate> {
    match month {
        Some(m) => NaiveDate::parse_from_str(&format!("{}-01", m), "%Y-%m-%d")
            .with_context(|| format!("Invalid month '{}', expected YYYY-MM", m)),
        None => Ok(today()),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let db = Database::open()?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Instructor { command } => {
            db.ensure_initialized()?;
            match command {
                InstructorCommands::Add { name, rate, tax } => {
                    let id = db.add_instructor(&name, rate, tax)?;
                    println!("Added instructor '{}' (ID: {})", name, id);
                }

                InstructorCommands::List { status } => {
                    let instructors = db.list_instructors(status.as_deref())?;
                    if instructors.is_empty() {
                        println!("No instructors found.");
                    } else {
                        println!(
                            "{:<6} {:<10} {:<30} {:>10} {:>8}",
                            "ID", "STATUS", "NAME", "RATE", "TAX %"
                        );
                        println!("{}", "-".repeat(68));
                        for i in instructors {
                            println!(
                                "{:<6} {:<10} {:<30} {:>10} {:>8}",
                                i.id,
                                i.status,
                                truncate(&i.full_name, 28),
                                i.hourly_rate.to_string(),
                                i.tax_rate_percentage.to_string()
                            );
                        }
                    }
                }

                InstructorCommands::SetRate { id, rate } => {
                    db.set_instructor_rate(id, rate)?;
                    println!("Instructor #{} rate set to {}", id, rate);
                }

                InstructorCommands::SetStatus { id, status } => {
                    db.set_instructor_status(id, &status)?;
                    println!("Instructor #{} status set to {}", id, status);
                }
            }
        }

        Commands::Course { command } => {
            db.ensure_initialized()?;
            match command {
                CourseCommands::Add { name, start, end } => {
                    let id = db.add_course(&name, start, end)?;
                    println!("Added course '{}' (ID: {})", name, id);
                }

                CourseCommands::List { status } => {
                    let courses = db.list_courses(status.as_deref())?;
                    if courses.is_empty() {
                        println!("No courses found.");
                    } else {
                        println!(
                            "{:<6} {:<10} {:<30} {:<12} {:<12}",
                            "ID", "STATUS", "NAME", "START", "END"
                        );
                        println!("{}", "-".repeat(74));
                        for c in courses {
                            println!(
                                "{:<6} {:<10} {:<30} {:<12} {:<12}",
                                c.id,
                                c.status,
                                truncate(&c.name, 28),
                                c.start_date,
                                c.end_date
                            );
                        }
                    }
                }

                CourseCommands::Assign {
                    course_id,
                    instructor_id,
                    primary,
                } => {
                    db.assign_instructor(course_id, instructor_id, primary)?;
                    println!(
                        "Assigned instructor #{} to course #{}{}",
                        instructor_id,
                        course_id,
                        if primary { " (primary)" } else { "" }
                    );
                }

                CourseCommands::LogHours {
                    course_id,
                    instructor_id,
                    hours,
                } => {
                    let total = db.log_hours(course_id, instructor_id, hours)?;
                    println!(
                        "Logged {} hours for instructor #{} on course #{} (total: {})",
                        hours, instructor_id, course_id, total
                    );
                }
            }
        }

        Commands::Student { command } => {
            db.ensure_initialized()?;
            match command {
                StudentCommands::Add { name } => {
                    let id = db.add_student(&name)?;
                    println!("Added student '{}' (ID: {})", name, id);
                }

                StudentCommands::List => {
                    let students = db.list_students(None)?;
                    if students.is_empty() {
                        println!("No students found.");
                    } else {
                        println!("{:<6} {:<10} {:<30}", "ID", "STATUS", "NAME");
                        println!("{}", "-".repeat(48));
                        for s in students {
                            println!("{:<6} {:<10} {:<30}", s.id, s.status, truncate(&s.full_name, 28));
                        }
                    }
                }

                StudentCommands::Enroll {
                    student_id,
                    course_id,
                } => {
                    db.enroll_student(student_id, course_id)?;
                    println!("Enrolled student #{} in course #{}", student_id, course_id);
                }
            }
        }

        Commands::Payment { command } => {
            db.ensure_initialized()?;
            match command {
                PaymentCommands::Add {
                    student_id,
                    amount,
                    due,
                } => {
                    let id = db.add_payment(student_id, amount, due)?;
                    println!("Added payment #{} of {} due {}", id, amount, due);
                }

                PaymentCommands::Pay { id, amount, date } => {
                    let payment = db.mark_payment_paid(id, amount, date.unwrap_or_else(today))?;
                    println!(
                        "Payment #{}: received {} of {} ({})",
                        payment.id, payment.amount_paid, payment.amount, payment.status
                    );
                }

                PaymentCommands::List { status } => {
                    let payments = db.list_payments(status.as_deref())?;
                    if payments.is_empty() {
                        println!("No payments found.");
                    } else {
                        println!(
                            "{:<6} {:<15} {:<25} {:>10} {:>10} {:<12}",
                            "ID", "STATUS", "STUDENT", "AMOUNT", "PAID", "DUE"
                        );
                        println!("{}", "-".repeat(82));
                        for p in payments {
                            println!(
                                "{:<6} {:<15} {:<25} {:>10} {:>10} {:<12}",
                                p.id,
                                p.status,
                                truncate(&p.student_name.unwrap_or_default(), 23),
                                p.amount.to_string(),
                                p.amount_paid.to_string(),
                                p.due_date
                            );
                        }
                    }
                }
            }
        }

        Commands::Expense { command } => {
            db.ensure_initialized()?;
            match command {
                ExpenseCommands::Add {
                    category,
                    amount,
                    month,
                    description,
                    date,
                } => {
                    let period = parse_month(Some(&month))?;
                    let id = db.add_expense(
                        &category,
                        &description,
                        amount,
                        date.unwrap_or_else(today),
                        period,
                    )?;
                    println!("Added expense #{} ({} {})", id, category, amount);
                }

                ExpenseCommands::Pay { id } => {
                    db.set_expense_status(id, "paid")?;
                    println!("Expense #{} marked as paid", id);
                }

                ExpenseCommands::List { month } => {
                    let period = month.as_deref().map(|m| parse_month(Some(m))).transpose()?;
                    let expenses = db.list_expenses(period)?;
                    if expenses.is_empty() {
                        println!("No expenses found.");
                    } else {
                        println!(
                            "{:<6} {:<10} {:<12} {:>10} {:<12} {:<30}",
                            "ID", "STATUS", "CATEGORY", "AMOUNT", "DATE", "DESCRIPTION"
                        );
                        println!("{}", "-".repeat(84));
                        for e in expenses {
                            println!(
                                "{:<6} {:<10} {:<12} {:>10} {:<12} {:<30}",
                                e.id,
                                e.status,
                                e.category,
                                e.amount.to_string(),
                                e.expense_date,
                                truncate(&e.description, 28)
                            );
                        }
                    }
                }
            }
        }

        Commands::Member { command } => {
            db.ensure_initialized()?;
            match command {
                MemberCommands::Add {
                    name,
                    share,
                    employment,
                } => {
                    let id = db.add_member(&name, share, &employment)?;
                    println!("Added member '{}' with {}% share (ID: {})", name, share, id);
                }

                MemberCommands::List { status } => {
                    let members = db.list_members(status.as_deref())?;
                    if members.is_empty() {
                        println!("No members found.");
                    } else {
                        println!(
                            "{:<6} {:<10} {:<25} {:>8} {:<14} {:<8}",
                            "ID", "STATUS", "NAME", "SHARE %", "EMPLOYMENT", "PAYOUT"
                        );
                        println!("{}", "-".repeat(75));
                        for m in members {
                            let payout = if m.can_receive_profit() { "yes" } else { "no" };
                            println!(
                                "{:<6} {:<10} {:<25} {:>8} {:<14} {:<8}",
                                m.id,
                                m.status,
                                truncate(&m.full_name, 23),
                                m.share_percentage.to_string(),
                                m.employment_status,
                                payout
                            );
                        }
                    }
                }

                MemberCommands::SetStatus { id, status } => {
                    db.set_member_status(id, &status)?;
                    println!("Member #{} status set to {}", id, status);
                }
            }
        }

        Commands::Payroll { command } => {
            db.ensure_initialized()?;
            match command {
                PayrollCommands::Calc { month } => {
                    let period = parse_month(month.as_deref())?;
                    let payments = finance::calculate_instructor_payments(&db, period)?;
                    if payments.is_empty() {
                        println!("No instructor hours found for {}.", period.format("%B %Y"));
                    } else {
                        println!("Calculated {} instructor payment(s):", payments.len());
                        print_payroll(&payments);
                    }
                }

                PayrollCommands::Approve { id } => {
                    db.set_instructor_payment_status(id, "approved")?;
                    println!("Instructor payment #{} approved", id);
                }

                PayrollCommands::Pay { id } => {
                    db.set_instructor_payment_status(id, "paid")?;
                    println!("Instructor payment #{} marked as paid", id);
                }

                PayrollCommands::List { month } => {
                    let period = parse_month(month.as_deref())?;
                    let payments = db.list_instructor_payments(period)?;
                    if payments.is_empty() {
                        println!("No instructor payments for {}.", period.format("%B %Y"));
                    } else {
                        print_payroll(&payments);
                    }
                }
            }
        }

        Commands::Settle { month, retain } => {
            db.ensure_initialized()?;
            let period = parse_month(month.as_deref())?;
            let summary = finance::calculate_monthly_profit(&db, period, retain)?;

            println!("Settlement for {}:", period.format("%B %Y"));
            println!("  Revenue:              {}", summary.total_revenue);
            println!("  Instructor payments:  {}", summary.instructor_payments);
            println!("  Operational expenses: {}", summary.operational_expenses);
            println!("  Total expenses:       {}", summary.total_expenses);
            println!("  Gross profit:         {}", summary.gross_profit);
            println!("  Retained ({}%):       {}", retain, summary.retained_earnings);
            println!("  Distributable:        {}", summary.distributable_profit);

            let distributions = db.list_member_distributions(summary.id)?;
            if distributions.is_empty() {
                println!("\nNo member distributions created.");
            } else {
                println!("\nMember distributions:");
                print_distributions(&distributions);
            }
        }

        Commands::Finalize { month } => {
            db.ensure_initialized()?;
            let period = parse_month(month.as_deref())?;
            let summary = db.finalize_month(period, today())?;
            println!(
                "Finalized {} (gross profit {})",
                period.format("%B %Y"),
                summary.gross_profit
            );
        }

        Commands::Summary { month, json } => {
            db.ensure_initialized()?;
            let period = parse_month(month.as_deref())?;
            match finance::get_financial_summary(&db, period)? {
                Some(view) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&view)?);
                    } else {
                        println!("Financial summary - {}", view.period);
                        println!("  Revenue:        {}", view.total_revenue);
                        println!("  Expenses:       {}", view.total_expenses);
                        println!("  Gross profit:   {}", view.gross_profit);
                        println!("  Retained:       {}", view.retained_earnings);
                        println!("  Distributable:  {}", view.distributable_profit);
                        println!("  Profit margin:  {}%", view.profit_margin);
                        println!("  Finalized:      {}", if view.is_finalized { "yes" } else { "no" });
                    }
                }
                None => {
                    println!("No financial summary for {}.", period.format("%B %Y"));
                }
            }
        }

        Commands::Kpis { json } => {
            db.ensure_initialized()?;
            let kpis = finance::dashboard_kpis(&db, today())?;
            if json {
                println!("{}", serde_json::to_string_pretty(&kpis)?);
            } else {
                println!("Active students:        {}", kpis.total_students);
                println!("Active courses:         {}", kpis.total_courses);
                println!("Active enrollments:     {}", kpis.total_enrollments);
                println!(
                    "Overdue payments:       {} ({})",
                    kpis.pending_payments_count, kpis.pending_payments_amount
                );
                println!("Current month revenue:  {}", kpis.current_month_revenue);
                println!("Current month profit:   {}", kpis.current_month_profit);
            }
        }

        Commands::Distribution { command } => {
            db.ensure_initialized()?;
            match command {
                DistributionCommands::List { month } => {
                    let period = parse_month(month.as_deref())?;
                    match db.get_monthly_financial(period)? {
                        Some(summary) => {
                            let distributions = db.list_member_distributions(summary.id)?;
                            if distributions.is_empty() {
                                println!("No distributions for {}.", period.format("%B %Y"));
                            } else {
                                print_distributions(&distributions);
                            }
                        }
                        None => {
                            println!("No settlement for {}. Run 'settle' first.", period.format("%B %Y"));
                        }
                    }
                }

                DistributionCommands::Pay { id } => {
                    db.set_distribution_status(id, "paid")?;
                    println!("Distribution #{} marked as paid", id);
                }
            }
        }

        Commands::Budget { command } => {
            db.ensure_initialized()?;
            match command {
                BudgetCommands::Set {
                    category,
                    amount,
                    month,
                } => {
                    let period = parse_month(month.as_deref())?;
                    db.set_budget(period, &category, amount)?;
                    println!(
                        "Budget for {} / {} set to {}",
                        period.format("%B %Y"),
                        category,
                        amount
                    );
                }

                BudgetCommands::Report { month } => {
                    let period = parse_month(month.as_deref())?;
                    let lines = db.budget_report(period)?;
                    if lines.is_empty() {
                        println!("No budget allocations for {}.", period.format("%B %Y"));
                    } else {
                        println!(
                            "{:<12} {:>12} {:>12} {:>12} {:>8}",
                            "CATEGORY", "ALLOCATED", "SPENT", "REMAINING", "USED %"
                        );
                        println!("{}", "-".repeat(60));
                        for line in lines {
                            println!(
                                "{:<12} {:>12} {:>12} {:>12} {:>8}",
                                line.category,
                                line.allocated_amount.to_string(),
                                line.spent_amount.to_string(),
                                line.remaining_budget.to_string(),
                                line.utilization_percentage.to_string()
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_payroll(payments: &[models::InstructorPayment]) {
    println!(
        "{:<6} {:<10} {:<25} {:>8} {:>8} {:>10} {:>10} {:>10}",
        "ID", "STATUS", "INSTRUCTOR", "HOURS", "RATE", "GROSS", "TAX", "NET"
    );
    println!("{}", "-".repeat(94));
    for p in payments {
        println!(
            "{:<6} {:<10} {:<25} {:>8} {:>8} {:>10} {:>10} {:>10}",
            p.id,
            p.status,
            truncate(p.instructor_name.as_deref().unwrap_or_default(), 23),
            p.total_hours.to_string(),
            p.hourly_rate.to_string(),
            p.gross_amount.to_string(),
            p.tax_amount.to_string(),
            p.net_amount.to_string()
        );
    }
}

fn print_distributions(distributions: &[models::MemberDistribution]) {
    println!(
        "{:<6} {:<10} {:<25} {:>8} {:>12} {:<8}",
        "ID", "STATUS", "MEMBER", "SHARE %", "AMOUNT", "PUBLIC"
    );
    println!("{}", "-".repeat(74));
    for d in distributions {
        println!(
            "{:<6} {:<10} {:<25} {:>8} {:>12} {:<8}",
            d.id,
            d.status,
            truncate(d.member_name.as_deref().unwrap_or_default(), 23),
            d.share_percentage.to_string(),
            d.amount.to_string(),
            if d.is_public_employee { "yes" } else { "no" }
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
