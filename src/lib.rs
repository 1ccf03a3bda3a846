pub mod shared {
    pub mod infrastructure {
        pub mod sqlite_migrations;
    }
}

pub mod modules {
    pub mod time_reports {
        pub mod core {
            pub mod financials;
            pub mod iso_week;
            pub mod report;
            pub mod settings;
            pub mod sync_status;
            pub mod time_entry;
            pub mod week_aggregator;
        }
        pub mod use_cases {
            pub mod sync_weekly_reports {
                pub mod command;
                pub mod handler;
                pub mod push_message;
                pub mod report_state;
                pub mod inbound {
                    pub mod http;
                }
            }
        }
        pub mod adapters {
            pub mod outbound {
                pub mod entity_store;
                pub mod entity_store_in_memory;
                pub mod entity_store_sqlite;
                pub mod remote_source;
                pub mod remote_source_http;
                pub mod remote_source_in_memory;
            }
        }
    }
}

pub mod shell;
