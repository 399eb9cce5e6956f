mod leader_change_case1;
mod retention_case1;
mod schedule_drain_case1;
mod schedule_race;
