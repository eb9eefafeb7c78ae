pub mod flowdtos;
