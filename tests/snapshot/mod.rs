mod boundary_cases;
mod failed_snapshot_case1;
mod failed_snapshot_case2;
mod snapshot_case1;
