//! Command-line arguments

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use partsource_domain::{AutomationType, DiscrepancyKind};
use uuid::Uuid;

/// PartSource - automated parts sourcing and procurement
#[derive(Parser, Debug)]
#[command(name = "partsource")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Config file (TOML or JSON); searched for in the working directory otherwise
    #[arg(short, long, env = "PARTSOURCE_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database file, overriding configuration
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Log filter directive, overriding configuration
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Source every line item in a JSON file (one item or an array)
    Process {
        file: PathBuf,

        /// Automation level for these lines
        #[arg(long, value_parser = parse_automation)]
        automation: Option<AutomationType>,

        /// Auto-approval price threshold
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Approve an analyzed request, defaulting to the recommended quote
    Approve {
        request_id: Uuid,

        #[arg(long)]
        quote: Option<Uuid>,

        #[arg(long)]
        by: String,
    },

    /// Reject every quote on an analyzed request
    Reject {
        request_id: Uuid,

        #[arg(long)]
        reason: String,

        #[arg(long)]
        by: String,
    },

    /// Cancel a request that has not been ordered
    Cancel {
        request_id: Uuid,

        #[arg(long, default_value = "cancelled by operator")]
        reason: String,

        #[arg(long, default_value = "operator")]
        by: String,
    },

    /// Requests waiting for a human decision
    Pending,

    /// Submit a draft purchase order for approval
    PoSubmit {
        /// PO id or PO number
        po: String,
    },

    /// Approve a purchase order awaiting approval
    PoApprove {
        po: String,

        #[arg(long)]
        by: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Cancel a purchase order
    PoCancel {
        po: String,

        #[arg(long)]
        reason: String,

        #[arg(long, default_value = "operator")]
        by: String,
    },

    /// Send an approved purchase order to its vendor
    Transmit { po: String },

    /// Record the vendor's acknowledgement of a sent purchase order
    Acknowledge {
        po: String,

        #[arg(long)]
        reference: Option<String>,
    },

    /// Record a receipt against a purchase order
    Receive {
        po: String,

        #[arg(long)]
        qty: u32,

        #[arg(long)]
        by: Option<String>,

        /// Problem noticed at the dock
        #[arg(long, value_parser = parse_discrepancy)]
        discrepancy: Option<DiscrepancyKind>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Clear an open receiving discrepancy
    Reconcile {
        po: String,

        #[arg(long)]
        by: String,

        #[arg(long)]
        note: String,
    },

    /// Close a fully received purchase order
    Close {
        po: String,

        #[arg(long, default_value = "operator")]
        by: String,
    },

    /// Vendor status listing
    Vendors,

    /// Health-check suspended vendors once, or a single vendor by id
    HealthCheck {
        #[arg(long)]
        vendor: Option<String>,
    },

    /// Run the vendor health scheduler until interrupted
    Monitor,
}

fn parse_automation(raw: &str) -> Result<AutomationType, String> {
    raw.replace('-', "_").parse()
}

fn parse_discrepancy(raw: &str) -> Result<DiscrepancyKind, String> {
    raw.replace('-', "_").parse()
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn arguments_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn automation_accepts_dashed_names() {
        let cli = Cli::parse_from([
            "partsource",
            "process",
            "lines.json",
            "--automation",
            "fully-automated",
            "--threshold",
            "250",
        ]);

        match cli.command {
            Command::Process { automation, threshold, .. } => {
                assert_eq!(automation, Some(AutomationType::FullyAutomated));
                assert_eq!(threshold, Some(250.0));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn receive_parses_a_discrepancy() {
        let cli = Cli::parse_from([
            "partsource",
            "receive",
            "RO500-2410-ACM-001",
            "--qty",
            "3",
            "--discrepancy",
            "wrong-part",
        ]);

        match cli.command {
            Command::Receive { po, qty, discrepancy, .. } => {
                assert_eq!(po, "RO500-2410-ACM-001");
                assert_eq!(qty, 3);
                assert_eq!(discrepancy, Some(DiscrepancyKind::WrongPart));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_automation_is_rejected() {
        let result =
            Cli::try_parse_from(["partsource", "process", "x.json", "--automation", "yolo"]);
        assert!(result.is_err());
    }
}
