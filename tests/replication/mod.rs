mod follower_replay_case1;
