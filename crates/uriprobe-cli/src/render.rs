//! Plain-text rendering of a [`ProbeReport`].

use std::fmt::{self, Display, Formatter};

use uriprobe_core::{ConnectionAccounting, Outcome, ReplicationStatus};
use uriprobe_introspect::ProbeReport;

const UNAVAILABLE: &str = "unavailable";

/// Borrowing wrapper that renders a report as aligned text.
pub struct TextReport<'a>(pub &'a ProbeReport);

impl Display for TextReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "{}", report.summary)?;
        field(f, "URI", &report.uri)?;
        field(f, "Client", &report.cli)?;
        if let Some(reachable) = report.reachable {
            field(f, "Reachable", if reachable { "yes" } else { "no" })?;
        }
        if let Some(address) = report.address {
            field(f, "Address", address)?;
        }

        field(f, "Version", OutcomeText(&report.identity))?;
        field(f, "Usage", OutcomeText(&report.usage))?;
        field(f, "Databases", OutcomeText(&report.database_count))?;
        if let Some(databases) = report.databases.value() {
            for database in databases {
                match database.object_count {
                    Some(count) => writeln!(f, "    {:<20} {} ({count} objects)", database.name, database.size)?,
                    None => writeln!(f, "    {:<20} {}", database.name, database.size)?,
                }
            }
        }

        if let Some(listing) = &report.tables {
            let label = format!("Tables in {}", listing.database);
            match listing.tables.value() {
                Some(tables) => {
                    field(f, &label, tables.len())?;
                    for table in tables {
                        match table.row_count {
                            Some(rows) => writeln!(f, "    {:<20} {} (~{rows} rows)", table.name, table.size)?,
                            None => writeln!(f, "    {:<20} {}", table.name, table.size)?,
                        }
                    }
                }
                None => field(f, &label, UNAVAILABLE)?,
            }
        }

        field(f, "Connections", AccountingText(&report.connection_accounting))?;
        field(f, "Access", OutcomeText(&report.privilege))?;
        field(f, "Replication", replication_label(report.replication))?;

        if let Some(estimate) = &report.row_estimate {
            let label = format!("Rows in {}", estimate.table);
            match estimate.estimate.value() {
                Some(rows) if rows.timed_out => {
                    field(f, &label, format!("at least {} (scan stopped at time cap)", rows.rows))?
                }
                Some(rows) => field(f, &label, format!("~{}", rows.rows))?,
                None => field(f, &label, UNAVAILABLE)?,
            }
        }

        if let Some(error) = &report.connection_error {
            field(f, "Last error", error)?;
        }
        Ok(())
    }
}

fn field(f: &mut Formatter<'_>, label: &str, value: impl Display) -> fmt::Result {
    writeln!(f, "  {label:<13} {value}")
}

fn replication_label(status: ReplicationStatus) -> &'static str {
    match status {
        ReplicationStatus::Active => "active",
        ReplicationStatus::Inactive => "inactive",
        ReplicationStatus::Unknown => "unknown",
    }
}

/// Value of an outcome, marked when it was inferred rather than read.
struct OutcomeText<'a, T>(&'a Outcome<T>);

impl<T: Display> Display for OutcomeText<'_, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Outcome::Live(value) => write!(f, "{value}"),
            Outcome::Degraded(value) => write!(f, "{value} (inferred)"),
            Outcome::Absent => f.write_str(UNAVAILABLE),
        }
    }
}

struct AccountingText<'a>(&'a Outcome<ConnectionAccounting>);

impl Display for AccountingText<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (accounting, inferred) = match self.0 {
            Outcome::Live(accounting) => (accounting, false),
            Outcome::Degraded(accounting) => (accounting, true),
            Outcome::Absent => return f.write_str(UNAVAILABLE),
        };
        match accounting {
            ConnectionAccounting::Measured { user: Some(user), global } => {
                write!(f, "user {user}, server {global}")?
            }
            ConnectionAccounting::Measured { user: None, global } => write!(f, "server {global}")?,
            ConnectionAccounting::Unavailable { reason, .. } => write!(f, "{UNAVAILABLE}: {reason}")?,
        }
        if inferred {
            f.write_str(" (inferred)")?;
        }
        Ok(())
    }
}
