mod list_summary;
