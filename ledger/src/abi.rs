//! ABI bindings for the game contract, the identity registry, and the
//! multicall aggregator.

use alloy::sol;

sol! {
    #[sol(rpc)]
    contract ISignalsGame {
        struct Settlement {
            uint256 matchId;
            uint8 choiceA;
            uint256 nonceA;
            bytes sigA;
            uint8 choiceB;
            uint256 nonceB;
            bytes sigB;
        }

        struct MatchView {
            uint256 matchId;
            uint256 tournamentId;
            address agentA;
            address agentB;
            uint8 choiceA;
            uint8 choiceB;
            uint8 result;
            bool settled;
        }

        struct AgentStatsView {
            uint256 totalPoints;
            uint32 matchesPlayed;
            uint32 splits;
            uint32 steals;
            uint32 timeouts;
        }

        struct PoolView {
            uint8 state;
            uint256 total;
            uint256[4] outcomePools;
        }

        struct TournamentView {
            uint256 id;
            uint8 state;
            uint256 entryStake;
            uint8 maxPlayers;
            uint8 totalRounds;
        }

        struct BetView {
            uint8 outcome;
            uint256 amount;
            bool claimed;
        }

        struct PlayerStatsView {
            uint32 points;
            uint32 matchesPlayed;
        }

        /// Emitted once per match created in a batch, in pair order.
        event MatchCreated(
            uint256 indexed matchId,
            address indexed agentA,
            address indexed agentB,
            uint256 tournamentId
        );

        event TournamentCreated(
            uint256 indexed tournamentId,
            uint256 entryStake,
            uint8 maxPlayers,
            uint8 totalRounds
        );

        function createQuickMatchBatch(address[] calldata agentsA, address[] calldata agentsB) external;
        function createTournamentMatchBatch(
            uint256 tournamentId,
            address[] calldata agentsA,
            address[] calldata agentsB,
            uint256 choiceWindow
        ) external;
        function settleMultiple(Settlement[] calldata settlements) external;
        function settleTimeout(uint256 matchId) external;
        function settlePartialTimeout(
            uint256 matchId,
            uint8 choice,
            uint256 nonce,
            bytes calldata sig,
            bool agentATimedOut
        ) external;
        function closeBetting(uint256 matchId) external;
        function closeBettingBatch(uint256[] calldata matchIds) external;
        function createTournament(
            uint256 entryStake,
            uint8 maxPlayers,
            uint8 totalRounds,
            uint256 registrationDuration
        ) external;
        function startTournament(uint256 tournamentId) external;
        function cancelTournament(uint256 tournamentId) external;
        function advanceToFinal(uint256 tournamentId) external;
        function completeTournament(uint256 tournamentId) external;
        function setFinalRankings(uint256 tournamentId, address[] calldata ranked) external;
        function joinTournamentFor(
            uint256 tournamentId,
            address agent,
            uint256 nonce,
            bytes calldata joinSig,
            uint256 permitDeadline,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;

        function getMatch(uint256 matchId) external view returns (MatchView memory);
        function getPool(uint256 matchId) external view returns (PoolView memory);
        function getOdds(uint256 matchId) external view returns (uint256[4] memory);
        function choiceNonces(address agent) external view returns (uint256);
        function getAgentStats(address agent) external view returns (AgentStatsView memory);
        function getAgentMatchIds(address agent) external view returns (uint256[] memory);
        function getTournamentMatchIds(uint256 tournamentId) external view returns (uint256[] memory);
        function getBet(uint256 matchId, address bettor) external view returns (BetView memory);
        function getBettorMatchIds(address bettor) external view returns (uint256[] memory);
        function tournaments(uint256 tournamentId) external view returns (TournamentView memory);
        function getPlayerStats(uint256 tournamentId, address agent) external view returns (PlayerStatsView memory);
        function getLeaderboard(uint256 offset, uint256 count)
            external
            view
            returns (address[] memory agents, uint256[] memory points, uint32[] memory matchesPlayed);
    }

    #[sol(rpc)]
    contract IAgentRegistry {
        struct AgentInfo {
            uint256 id;
            address wallet;
            string name;
        }

        function isRegistered(address wallet) external view returns (bool);
        function getAgentByWallet(address wallet) external view returns (AgentInfo memory);
        function agentCount() external view returns (uint256);
        function getAgents(uint256 startId, uint256 count) external view returns (AgentInfo[] memory);
    }

    #[sol(rpc)]
    contract IMulticall3 {
        struct Call3 {
            address target;
            bool allowFailure;
            bytes callData;
        }

        struct Result {
            bool success;
            bytes returnData;
        }

        function aggregate3(Call3[] calldata calls) external payable returns (Result[] memory returnData);
    }
}
